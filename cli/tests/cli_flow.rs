//! End-to-end runs of the `cohort` binary against a temporary store

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const ADMIN: &str = "0x00000000000000000000000000000000000000ad";
const ALICE: &str = "0x0000000000000000000000000000000000000001";
const BOB: &str = "0x0000000000000000000000000000000000000002";
const CAROL: &str = "0x0000000000000000000000000000000000000003";
const PAYEE: &str = "0x0000000000000000000000000000000000000042";

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    let contents = format!(
        "[node]\ndata_dir = \"{}\"\nlog_level = \"warn\"\n\n[permissions]\nadmins = [\"{}\"]\n",
        dir.join("data").display(),
        ADMIN
    );
    std::fs::write(&path, contents).unwrap();
    path
}

fn cohort(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cohort"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

fn ok(config: &Path, args: &[&str]) -> String {
    let output = cohort(config, args);
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_group_vote_and_early_execution() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let members = format!("{},{},{}", ALICE, BOB, CAROL);

    ok(
        &config,
        &[
            "--as", ADMIN, "--block", "1", "--time", "1000", "group", "create", "--name",
            "council", "--members", &members, "--mode", "early",
        ],
    );
    ok(&config, &["clock", "advance", "--blocks", "1", "--secs", "10"]);
    ok(&config, &["--as", ADMIN, "deposit", "0", "500", "--mint"]);

    let action = format!("{}:100", PAYEE);
    let out = ok(
        &config,
        &["--as", ALICE, "propose", "0", "--action", &action, "--vote", "yes"],
    );
    assert!(out.contains("Proposal 0 created"));

    let out = ok(&config, &["--as", BOB, "vote", "0", "yes", "--early"]);
    assert!(out.contains("executed"));

    let json = ok(&config, &["proposal", "show", "0", "--json"]);
    let view: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(view["executed"], serde_json::Value::Bool(true));
    assert_eq!(view["tally"]["yes"], 2);

    let list = ok(&config, &["group", "list"]);
    assert!(list.contains("council"));
    assert!(list.contains("400 native"));
}

#[test]
fn test_failed_command_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    ok(
        &config,
        &[
            "--as", ADMIN, "--block", "1", "--time", "1000", "group", "create", "--name",
            "council", "--members", ALICE,
        ],
    );

    // Not an admin
    let output = cohort(
        &config,
        &["--as", BOB, "members", "add", "0", CAROL],
    );
    assert!(!output.status.success());

    let out = ok(&config, &["members", "check", "0", CAROL]);
    assert!(out.contains("is not listed"));

    // Clock cannot go backwards
    let output = cohort(&config, &["--block", "0", "clock", "advance", "--blocks", "0"]);
    assert!(!output.status.success());
}

#[test]
fn test_deposit_needs_host_funds() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    ok(
        &config,
        &[
            "--as", ADMIN, "--block", "1", "--time", "1000", "group", "create", "--name",
            "council", "--members", ALICE,
        ],
    );

    // The caller holds nothing on the host
    let output = cohort(&config, &["--as", BOB, "deposit", "0", "10"]);
    assert!(!output.status.success());
    let list = ok(&config, &["group", "list"]);
    assert!(!list.contains("10 native"));

    ok(&config, &["--as", BOB, "deposit", "0", "10", "--mint"]);
    let list = ok(&config, &["group", "list"]);
    assert!(list.contains("10 native"));
}

#[test]
fn test_token_transfer_from_caller() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let token = "0x00000000000000000000000000000000000000cc";

    ok(&config, &["--block", "1", "token", "mint", token, ALICE, "10"]);
    let out = ok(&config, &["--as", ALICE, "--block", "2", "token", "transfer", token, BOB, "4"]);
    assert!(out.contains("Transferred 4"));

    // Alice only holds 6 now
    let output = cohort(&config, &["--as", ALICE, "--block", "3", "token", "transfer", token, BOB, "7"]);
    assert!(!output.status.success());
}

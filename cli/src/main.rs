//! Cohort operator CLI
//!
//! Runs governance operations against a local sled store. Every command
//! loads the state, executes at the given block context, and saves only
//! if the command succeeded.

mod config;
mod node;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cohort_core::ratio::format_ratio;
use cohort_core::{
    parse_ratio, Address, Amount, Asset, BlockContext, Capability, Permission, RatioError, Scope,
    Timestamp,
};
use governance::{
    AbstainPolicy, Action, InitialDeposit, MembershipConfig, ProposalRequest, VoteOption,
    VotingMode, VotingSettings,
};
use primitive_types::U256;
use std::path::PathBuf;

use crate::config::{default_config_path, Config};
use crate::node::Node;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "cohort")]
#[command(about = "Group-partitioned governance operator tool", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Block number to act at (defaults to the last committed block)
    #[arg(long, global = true)]
    block: Option<u64>,

    /// Block timestamp to act at (defaults to the last committed time)
    #[arg(long, global = true)]
    time: Option<Timestamp>,

    /// Account performing the command
    #[arg(long = "as", value_name = "ADDRESS", global = true)]
    caller: Option<Address>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Manage address-list membership
    Members {
        #[command(subcommand)]
        command: MembersCommands,
    },

    /// Simulated governance tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Send funds from the caller into a group vault
    Deposit {
        group: u64,
        amount: Amount,
        #[arg(long, default_value = "native")]
        asset: Asset,
        /// Credit the caller on the simulated host first
        #[arg(long)]
        mint: bool,
    },

    /// Open a proposal
    Propose {
        group: u64,
        /// Opaque metadata pointer, e.g. ipfs://...
        #[arg(long, default_value = "")]
        metadata: String,
        /// TARGET:VALUE[:HEX_PAYLOAD], repeatable
        #[arg(long = "action", value_parser = parse_action)]
        actions: Vec<Action>,
        /// Index of an action that may fail, repeatable
        #[arg(long = "allow-failure")]
        allow_failure: Vec<usize>,
        /// Start timestamp, 0 for now
        #[arg(long, default_value_t = 0)]
        start: Timestamp,
        /// End timestamp, 0 for start plus the minimum duration
        #[arg(long, default_value_t = 0)]
        end: Timestamp,
        /// Cast the creator's vote right away
        #[arg(long)]
        vote: Option<VoteOption>,
        /// Execute immediately if the creator's vote decides it
        #[arg(long)]
        early: bool,
    },

    /// Vote on a proposal
    Vote {
        proposal: u64,
        option: VoteOption,
        /// Execute immediately if this vote decides the proposal
        #[arg(long)]
        early: bool,
    },

    /// Execute a decided proposal
    Execute { proposal: u64 },

    /// Pay out of a group vault
    Withdraw {
        group: u64,
        amount: Amount,
        recipient: Address,
        #[arg(long, default_value = "native")]
        asset: Asset,
    },

    /// Inspect proposals
    Proposal {
        #[command(subcommand)]
        command: ProposalCommands,
    },

    /// Move the local chain clock
    Clock {
        #[command(subcommand)]
        command: ClockCommands,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create a group with its own vault
    Create {
        #[arg(long)]
        name: String,
        /// Token whose balances are voting power
        #[arg(long, conflicts_with = "members")]
        token: Option<Address>,
        /// Initial address list, comma separated
        #[arg(long, value_delimiter = ',')]
        members: Vec<Address>,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Native funds moved from the caller into the new vault
        #[arg(long)]
        deposit: Option<Amount>,
        /// Credit the deposit to the caller on the simulated host first
        #[arg(long, requires = "deposit")]
        mint: bool,
    },
    /// Show one group
    Show { group: u64 },
    /// List all groups
    List,
    /// Change a group's voting settings
    Settings {
        group: u64,
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Subcommand)]
enum MembersCommands {
    Add {
        group: u64,
        #[arg(required = true)]
        accounts: Vec<Address>,
    },
    Remove {
        group: u64,
        #[arg(required = true)]
        accounts: Vec<Address>,
    },
    /// Was the account listed at a block
    Check {
        group: u64,
        account: Address,
        /// Defaults to the current block
        #[arg(long)]
        at: Option<u64>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Mint (registering the token on first use)
    Mint {
        token: Address,
        to: Address,
        amount: Amount,
    },
    Burn {
        token: Address,
        from: Address,
        amount: Amount,
    },
    /// Move tokens from the caller
    Transfer {
        token: Address,
        to: Address,
        amount: Amount,
    },
}

#[derive(Subcommand)]
enum ProposalCommands {
    Show {
        proposal: u64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ClockCommands {
    Advance {
        #[arg(long, default_value_t = 1)]
        blocks: u64,
        #[arg(long, default_value_t = 0)]
        secs: u64,
        /// Jump the timestamp to the wall clock
        #[arg(long)]
        now: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Standard,
    Early,
    Replacement,
}

#[derive(Clone, Copy, ValueEnum)]
enum AbstainArg {
    Final,
    Reversible,
}

/// Overrides on top of the configured voting defaults
#[derive(Args)]
struct SettingsArgs {
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// e.g. 50%, 0.5 or 500000
    #[arg(long)]
    support: Option<String>,
    #[arg(long)]
    participation: Option<String>,
    /// Seconds
    #[arg(long)]
    min_duration: Option<u64>,
    #[arg(long)]
    min_proposer_power: Option<Amount>,
    #[arg(long, value_enum)]
    abstain: Option<AbstainArg>,
}

impl SettingsArgs {
    fn apply(&self, mut settings: VotingSettings) -> Result<VotingSettings, RatioError> {
        if let Some(mode) = self.mode {
            settings.voting_mode = match mode {
                ModeArg::Standard => VotingMode::Standard,
                ModeArg::Early => VotingMode::EarlyExecution,
                ModeArg::Replacement => VotingMode::VoteReplacement,
            };
        }
        if let Some(support) = &self.support {
            settings.support_threshold = parse_ratio(support)?;
        }
        if let Some(participation) = &self.participation {
            settings.min_participation = parse_ratio(participation)?;
        }
        if let Some(duration) = self.min_duration {
            settings.min_duration = duration;
        }
        if let Some(power) = self.min_proposer_power {
            settings.min_proposer_voting_power = power;
        }
        if let Some(abstain) = self.abstain {
            settings.abstain_policy = match abstain {
                AbstainArg::Final => AbstainPolicy::Final,
                AbstainArg::Reversible => AbstainPolicy::Reversible,
            };
        }
        Ok(settings)
    }
}

fn parse_action(text: &str) -> Result<Action, String> {
    let mut parts = text.splitn(3, ':');
    let target: Address = parts
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|e| format!("bad target: {}", e))?;
    let value: Amount = match parts.next() {
        Some(v) => v.parse().map_err(|e| format!("bad value: {}", e))?,
        None => 0,
    };
    let payload = match parts.next() {
        Some(hex_data) => hex::decode(hex_data.trim_start_matches("0x"))
            .map_err(|e| format!("bad payload: {}", e))?,
        None => Vec::new(),
    };
    Ok(Action::new(target, value, payload))
}

fn failure_map(indices: &[usize]) -> CliResult<U256> {
    let mut map = U256::zero();
    for &index in indices {
        if index >= governance::config::MAX_ACTIONS {
            return Err(format!("allow-failure index {} out of range", index).into());
        }
        map |= U256::one() << index;
    }
    Ok(map)
}

fn format_time(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn require_caller(cli: &Cli) -> CliResult<Address> {
    cli.caller
        .ok_or_else(|| "this command needs --as <ADDRESS>".into())
}

fn capability(node: &Node, holder: Address, scope: Scope, permission: Permission) -> CliResult<Capability> {
    Ok(Capability::issue(&node.permissions, holder, scope, permission)?)
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.node.log_level.as_str()),
    )
    .init();

    let mut node = Node::open(&config)?;
    let clock = node.clock();
    let ctx = BlockContext::new(
        cli.block.unwrap_or(clock.number),
        cli.time.unwrap_or(clock.timestamp),
    );

    run(&cli, &mut node, ctx)?;

    for event in node.engine.take_events() {
        log::debug!("event {}: {:?}", event.kind(), event);
    }
    node.save()?;
    Ok(())
}

fn run(cli: &Cli, node: &mut Node, ctx: BlockContext) -> CliResult<()> {
    match &cli.command {
        Commands::Group { command } => run_group(cli, node, ctx, command),
        Commands::Members { command } => run_members(cli, node, ctx, command),
        Commands::Token { command } => run_token(cli, node, ctx, command),

        Commands::Deposit {
            group,
            amount,
            asset,
            mint,
        } => {
            let from = require_caller(cli)?;
            if *mint {
                mint_on_host(node, from, *asset, *amount);
            }
            node.engine.deposit(&ctx, *group, from, *asset, *amount)?;
            println!("💰 Deposited {} {} into group {}", amount, asset, group);
            Ok(())
        }

        Commands::Propose {
            group,
            metadata,
            actions,
            allow_failure,
            start,
            end,
            vote,
            early,
        } => {
            let creator = require_caller(cli)?;
            let id = node.engine.create_proposal(
                &ctx,
                creator,
                ProposalRequest {
                    group_id: *group,
                    metadata: metadata.clone(),
                    actions: actions.clone(),
                    allow_failure_map: failure_map(allow_failure)?,
                    start_date: *start,
                    end_date: *end,
                    creator_vote: *vote,
                    try_early_execution: *early,
                },
            )?;
            let view = node.engine.get_proposal(id, ctx.timestamp)?;
            println!("📝 Proposal {} created in group {}", id, group);
            println!(
                "   Voting {} → {}",
                format_time(view.parameters.start_date),
                format_time(view.parameters.end_date)
            );
            Ok(())
        }

        Commands::Vote {
            proposal,
            option,
            early,
        } => {
            let voter = require_caller(cli)?;
            let cast = node.engine.vote(&ctx, voter, *proposal, *option, *early)?;
            match cast.replaced {
                Some(previous) => println!(
                    "🗳️  Vote on proposal {} changed {} → {} (power {})",
                    proposal, previous, option, cast.voting_power
                ),
                None => println!(
                    "🗳️  Voted {} on proposal {} (power {})",
                    option, proposal, cast.voting_power
                ),
            }
            if node.engine.proposal(*proposal)?.executed {
                println!("✅ Proposal {} executed", proposal);
            }
            Ok(())
        }

        Commands::Execute { proposal } => {
            let outcome = node.engine.execute(&ctx, *proposal)?;
            println!(
                "✅ Proposal {} executed ({} action(s))",
                proposal,
                outcome.results.len()
            );
            if !outcome.failure_map.is_zero() {
                println!("   Skipped failures: {:#x}", outcome.failure_map);
            }
            Ok(())
        }

        Commands::Withdraw {
            group,
            amount,
            recipient,
            asset,
        } => {
            let holder = require_caller(cli)?;
            let cap = capability(node, holder, Scope::Group(*group), Permission::Withdraw)?;
            node.engine
                .withdraw(&cap, &ctx, *group, *asset, *amount, *recipient)?;
            println!("💸 Paid {} {} from group {} to {}", amount, asset, group, recipient);
            Ok(())
        }

        Commands::Proposal {
            command: ProposalCommands::Show { proposal, json },
        } => {
            let view = node.engine.get_proposal(*proposal, ctx.timestamp)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }
            println!("\n📋 Proposal {}", view.id);
            println!("═══════════════════════════════════");
            println!("Group:        {}", view.group_id);
            println!("Creator:      {}", view.creator);
            println!("Metadata:     {}", view.metadata);
            println!("Status:       {}", view.status);
            println!("Mode:         {:?}", view.parameters.voting_mode);
            println!("Support:      > {}", format_ratio(view.parameters.support_threshold));
            println!(
                "Window:       {} → {}",
                format_time(view.parameters.start_date),
                format_time(view.parameters.end_date)
            );
            println!("Snapshot:     block {}", view.parameters.snapshot_block);
            println!(
                "Tally:        yes {} / no {} / abstain {} of {}",
                view.tally.yes, view.tally.no, view.tally.abstain, view.total_voting_power
            );
            println!("Quorum:       {}", view.parameters.min_voting_power);
            println!(
                "Executable:   {}",
                node.engine.can_execute(view.id, ctx.timestamp)?
            );
            for (index, action) in view.actions.iter().enumerate() {
                println!(
                    "  {}. {} value {} ({} byte payload)",
                    index,
                    action.target,
                    action.value,
                    action.payload.len()
                );
            }
            println!();
            Ok(())
        }

        Commands::Clock {
            command: ClockCommands::Advance { blocks, secs, now },
        } => {
            let timestamp = if *now {
                let wall = chrono::Utc::now().timestamp().max(0) as u64;
                wall.max(ctx.timestamp)
            } else {
                ctx.timestamp.saturating_add(*secs)
            };
            let next = BlockContext::new(ctx.number.saturating_add(*blocks), timestamp);
            node.engine.advance_clock(&next)?;
            println!("⏱️  Block {} at {}", next.number, format_time(next.timestamp));
            Ok(())
        }
    }
}

fn run_group(cli: &Cli, node: &mut Node, ctx: BlockContext, command: &GroupCommands) -> CliResult<()> {
    match command {
        GroupCommands::Create {
            name,
            token,
            members,
            settings,
            deposit,
            mint,
        } => {
            let caller = require_caller(cli)?;
            let cap = capability(node, caller, Scope::Organization, Permission::CreateGroup)?;
            let membership = match token {
                Some(token) => MembershipConfig::TokenBalance { token: *token },
                None => MembershipConfig::AddressList {
                    members: members.clone(),
                },
            };
            let settings = settings.apply(node.defaults.clone())?;
            let initial_deposit = match deposit {
                Some(amount) => {
                    if *mint {
                        mint_on_host(node, caller, Asset::Native, *amount);
                    }
                    Some(InitialDeposit {
                        from: caller,
                        asset: Asset::Native,
                        amount: *amount,
                    })
                }
                None => None,
            };

            let id = node
                .engine
                .create_group(&cap, &ctx, name.clone(), membership, settings, initial_deposit)?;
            let group = node.engine.group(id)?;
            println!("🏛️  Group {} '{}' created", id, group.name);
            println!("   Vault: {}", group.vault_address);
            Ok(())
        }

        GroupCommands::Show { group } => {
            let g = node.engine.group(*group)?;
            let vault = node.engine.vault(*group)?;
            println!("\n🏛️  Group {} '{}'", g.id, g.name);
            println!("═══════════════════════════════════");
            println!("Membership:   {}", g.membership.mode_name());
            if let Some(list) = g.membership.address_list() {
                for member in list.members() {
                    println!("  • {}", member);
                }
            }
            println!("Mode:         {:?}", g.settings.voting_mode);
            println!("Support:      > {}", format_ratio(g.settings.support_threshold));
            println!("Participation: {}", format_ratio(g.settings.min_participation));
            println!("Min duration: {}s", g.settings.min_duration);
            println!("Abstentions:  {:?}", g.settings.abstain_policy);
            println!("Vault:        {}", g.vault_address);
            for (asset, amount) in vault.balances() {
                println!("  {} {}", amount, asset);
            }
            let proposals: Vec<u64> = node
                .engine
                .state()
                .proposals
                .by_group(*group)
                .map(|p| p.id)
                .collect();
            println!("Proposals:    {:?}", proposals);
            println!();
            Ok(())
        }

        GroupCommands::List => {
            println!("\n🏛️  Groups ({})", node.engine.group_count());
            println!("═══════════════════════════════════");
            for (group, vault) in node.engine.state().registry.iter() {
                println!(
                    "{:>4}  {:<20} {:<14} {} native",
                    group.id,
                    group.name,
                    group.membership.mode_name(),
                    vault.balance(&Asset::Native)
                );
            }
            println!();
            Ok(())
        }

        GroupCommands::Settings { group, settings } => {
            let caller = require_caller(cli)?;
            let cap = capability(
                node,
                caller,
                Scope::Group(*group),
                Permission::UpdateVotingSettings,
            )?;
            let current = node.engine.group(*group)?.settings.clone();
            let updated = settings.apply(current)?;
            node.engine
                .update_voting_settings(&cap, &ctx, *group, updated)?;
            println!("⚙️  Voting settings of group {} updated", group);
            Ok(())
        }
    }
}

fn run_members(
    cli: &Cli,
    node: &mut Node,
    ctx: BlockContext,
    command: &MembersCommands,
) -> CliResult<()> {
    match command {
        MembersCommands::Add { group, accounts } => {
            let caller = require_caller(cli)?;
            let cap = capability(node, caller, Scope::Group(*group), Permission::ManageMembership)?;
            node.engine.add_addresses(&cap, &ctx, *group, accounts)?;
            println!("👥 Added {} member(s) to group {} at block {}", accounts.len(), group, ctx.number);
            Ok(())
        }
        MembersCommands::Remove { group, accounts } => {
            let caller = require_caller(cli)?;
            let cap = capability(node, caller, Scope::Group(*group), Permission::ManageMembership)?;
            node.engine.remove_addresses(&cap, &ctx, *group, accounts)?;
            println!(
                "👥 Removed {} member(s) from group {} at block {}",
                accounts.len(),
                group,
                ctx.number
            );
            Ok(())
        }
        MembersCommands::Check { group, account, at } => {
            let block = at.unwrap_or(ctx.number);
            let listed = node.engine.is_listed_at_block(*group, account, block)?;
            println!(
                "{} {} listed in group {} at block {}",
                account,
                if listed { "is" } else { "is not" },
                group,
                block
            );
            Ok(())
        }
    }
}

fn mint_on_host(node: &mut Node, account: Address, asset: Asset, amount: Amount) {
    node.engine.host_mut().fund(account, asset, amount);
    println!("🚰 Minted {} {} to {} on the host", amount, asset, account);
}

fn run_token(cli: &Cli, node: &mut Node, ctx: BlockContext, command: &TokenCommands) -> CliResult<()> {
    match command {
        TokenCommands::Mint { token, to, amount } => {
            let tokens = node.engine.tokens_mut();
            if !tokens.tokens().any(|t| t == token) {
                tokens.register(*token)?;
                println!("🪙 Registered token {}", token);
            }
            tokens.mint(token, to, *amount, ctx.number)?;
            node.engine.advance_clock(&ctx)?;
            println!("🪙 Minted {} of {} to {} at block {}", amount, token, to, ctx.number);
            Ok(())
        }
        TokenCommands::Burn { token, from, amount } => {
            node.engine
                .tokens_mut()
                .burn(token, from, *amount, ctx.number)?;
            node.engine.advance_clock(&ctx)?;
            println!("🔥 Burned {} of {} from {} at block {}", amount, token, from, ctx.number);
            Ok(())
        }
        TokenCommands::Transfer { token, to, amount } => {
            let from = require_caller(cli)?;
            node.engine
                .tokens_mut()
                .transfer(token, &from, to, *amount, ctx.number)?;
            node.engine.advance_clock(&ctx)?;
            println!(
                "🪙 Transferred {} of {} from {} to {} at block {}",
                amount, token, from, to, ctx.number
            );
            Ok(())
        }
    }
}

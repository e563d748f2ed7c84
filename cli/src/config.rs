//! Operator configuration (TOML)

use cohort_core::{parse_ratio, Address, Permission, PermissionTable, RatioError, Scope};
use governance::{config, AbstainPolicy, EngineOptions, VotingMode, VotingSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid ratio in [voting]: {0}")]
    Ratio(#[from] RatioError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub proposals: ProposalConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "$HOME/.cohort/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Defaults for new groups. Ratios accept "50%", "0.5" or "500000".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub mode: VotingMode,
    pub support_threshold: String,
    pub min_participation: String,
    pub min_duration: u64,
    pub min_proposer_voting_power: u64,
    pub abstain_policy: AbstainPolicy,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            mode: VotingMode::Standard,
            support_threshold: "50%".to_string(),
            min_participation: "20%".to_string(),
            min_duration: config::MIN_DURATION_LOWER_BOUND,
            min_proposer_voting_power: 1,
            abstain_policy: AbstainPolicy::Final,
        }
    }
}

impl VotingConfig {
    pub fn settings(&self) -> Result<VotingSettings, ConfigError> {
        Ok(VotingSettings {
            voting_mode: self.mode,
            support_threshold: parse_ratio(&self.support_threshold)?,
            min_participation: parse_ratio(&self.min_participation)?,
            min_duration: self.min_duration,
            min_proposer_voting_power: self.min_proposer_voting_power as u128,
            abstain_policy: self.abstain_policy,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalConfig {
    pub start_grace_secs: u64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            start_grace_secs: config::DEFAULT_START_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Hold every permission everywhere
    #[serde(default)]
    pub admins: Vec<Address>,
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantConfig {
    pub holder: Address,
    /// Omit for an organization-wide grant
    pub group: Option<u64>,
    pub permission: Permission,
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        // Surface bad ratios at startup rather than on first group creation
        config.voting.settings()?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.node.data_dir))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            start_grace_secs: self.proposals.start_grace_secs,
        }
    }

    pub fn permission_table(&self) -> PermissionTable {
        let mut table = PermissionTable::with_admins(self.permissions.admins.iter().copied());
        for grant in &self.permissions.grants {
            let scope = grant.group.map(Scope::Group).unwrap_or(Scope::Organization);
            table.grant(grant.holder, scope, grant.permission);
        }
        table
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(expand_path("$HOME/.cohort/config.toml"))
}

pub fn expand_path(path: &str) -> String {
    path.replace("$HOME", &std::env::var("HOME").unwrap_or_default())
}

//! Per-group voting settings

use cohort_core::ratio::check_ratio;
use cohort_core::{Amount, RATIO_BASE};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{GovernanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VotingMode {
    /// One vote per member, decided at the end of the window
    #[default]
    Standard,
    /// Execution allowed as soon as the outcome cannot change
    EarlyExecution,
    /// Members may change their vote until the window closes
    VoteReplacement,
}

/// How abstentions are treated when checking whether an outcome can
/// still flip before the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AbstainPolicy {
    /// Abstentions are final and stay out of the worst-case "no" bucket
    #[default]
    Final,
    /// Abstentions could still turn into "no" votes
    Reversible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSettings {
    pub voting_mode: VotingMode,
    /// Required share of yes among yes+no, strictly exceeded. Scaled by `RATIO_BASE`.
    pub support_threshold: u32,
    /// Required share of total voting power that must vote. Scaled by `RATIO_BASE`.
    pub min_participation: u32,
    /// Minimum voting window in seconds
    pub min_duration: u64,
    /// Voting power needed to open a proposal; zero lets anyone propose
    pub min_proposer_voting_power: Amount,
    #[serde(default)]
    pub abstain_policy: AbstainPolicy,
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            voting_mode: VotingMode::Standard,
            support_threshold: RATIO_BASE / 2,
            min_participation: RATIO_BASE / 5,
            min_duration: config::MIN_DURATION_LOWER_BOUND,
            min_proposer_voting_power: 1,
            abstain_policy: AbstainPolicy::Final,
        }
    }
}

impl VotingSettings {
    /// Check ratios and duration bounds
    pub fn validate(&self) -> Result<()> {
        // A 100% threshold could never be strictly exceeded.
        check_ratio(RATIO_BASE - 1, self.support_threshold)?;
        check_ratio(RATIO_BASE, self.min_participation)?;

        if self.min_duration < config::MIN_DURATION_LOWER_BOUND {
            return Err(GovernanceError::MinDurationOutOfBounds {
                limit: config::MIN_DURATION_LOWER_BOUND,
                actual: self.min_duration,
            });
        }
        if self.min_duration > config::MIN_DURATION_UPPER_BOUND {
            return Err(GovernanceError::MinDurationOutOfBounds {
                limit: config::MIN_DURATION_UPPER_BOUND,
                actual: self.min_duration,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(VotingSettings::default().validate().is_ok());
    }

    #[test]
    fn test_support_threshold_bounds() {
        let settings = VotingSettings {
            support_threshold: RATIO_BASE,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(GovernanceError::RatioOutOfBounds {
                limit: RATIO_BASE - 1,
                actual: RATIO_BASE
            })
        );
    }

    #[test]
    fn test_participation_bounds() {
        let ok = VotingSettings {
            min_participation: RATIO_BASE,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = VotingSettings {
            min_participation: RATIO_BASE + 1,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(GovernanceError::RatioOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_duration_bounds() {
        let short = VotingSettings {
            min_duration: config::MIN_DURATION_LOWER_BOUND - 1,
            ..Default::default()
        };
        assert_eq!(
            short.validate(),
            Err(GovernanceError::MinDurationOutOfBounds {
                limit: config::MIN_DURATION_LOWER_BOUND,
                actual: config::MIN_DURATION_LOWER_BOUND - 1
            })
        );

        let long = VotingSettings {
            min_duration: config::MIN_DURATION_UPPER_BOUND + 1,
            ..Default::default()
        };
        assert!(matches!(
            long.validate(),
            Err(GovernanceError::MinDurationOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_abstain_policy_defaults_when_missing() {
        let json = r#"{
            "voting_mode": "EarlyExecution",
            "support_threshold": 500000,
            "min_participation": 200000,
            "min_duration": 3600,
            "min_proposer_voting_power": 1
        }"#;
        let settings: VotingSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.abstain_policy, AbstainPolicy::Final);
        assert_eq!(settings.voting_mode, VotingMode::EarlyExecution);
    }
}

//! Governance error types

use cohort_core::{
    Address, BlockContext, BlockNumber, CheckpointError, PermissionError, RatioError, Timestamp,
    TokenError,
};
use thiserror::Error;
use treasury::VaultError;

use crate::proposal::VoteOption;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Proposal creation forbidden for {account}")]
    ProposalCreationForbidden { account: Address },

    #[error("Date out of bounds: limit {limit}, actual {actual}")]
    DateOutOfBounds { limit: Timestamp, actual: Timestamp },

    #[error("Duration out of bounds: limit {limit}, actual {actual}")]
    MinDurationOutOfBounds { limit: u64, actual: u64 },

    #[error("Vote cast forbidden: proposal {proposal_id}, account {account}, option {option:?}")]
    VoteCastForbidden {
        proposal_id: u64,
        account: Address,
        option: VoteOption,
    },

    #[error("Proposal execution forbidden: {proposal_id}")]
    ProposalExecutionForbidden { proposal_id: u64 },

    #[error("Group {group_id} has no voting power at block {block}")]
    NoVotingPower { group_id: u64, block: BlockNumber },

    #[error("Ratio out of bounds: limit {limit}, actual {actual}")]
    RatioOutOfBounds { limit: u32, actual: u32 },

    #[error("Group not found: {0}")]
    GroupNotFound(u64),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] PermissionError),

    #[error("Account already listed: {account}")]
    AlreadyListed { account: Address },

    #[error("Account not listed: {account}")]
    NotListed { account: Address },

    #[error("Group {0} does not use an address list")]
    NotAddressList(u64),

    #[error("Token {0} has no recognizable balance interface")]
    UnsupportedToken(Address),

    #[error("Too many actions: limit {limit}, actual {actual}")]
    TooManyActions { limit: usize, actual: usize },

    #[error("Action {index} failed: {reason}")]
    ActionFailed { index: usize, reason: String },

    #[error("Initial deposit failed: {0}")]
    InitialDepositFailed(String),

    #[error("Host transfer failed: {0}")]
    HostTransferFailed(String),

    #[error("Clock went backwards: last {last:?}, given {given:?}")]
    ClockRegression {
        last: BlockContext,
        given: BlockContext,
    },

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl From<RatioError> for GovernanceError {
    fn from(e: RatioError) -> Self {
        match e {
            RatioError::OutOfBounds { limit, actual } => {
                GovernanceError::RatioOutOfBounds { limit, actual }
            }
            // Literals are parsed before they reach the engine; treat a bad
            // one as an out-of-range ratio.
            RatioError::InvalidLiteral(_) => GovernanceError::RatioOutOfBounds {
                limit: cohort_core::RATIO_BASE,
                actual: u32::MAX,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;

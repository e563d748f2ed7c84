//! Cohort Governance Module
//!
//! Group-partitioned majority voting: a registry of groups, each with its
//! own membership rule, voting settings and vault, plus the proposal,
//! voting and execution engines that run on top of them.

pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod membership;
pub mod proposal;
pub mod registry;
pub mod settings;
pub mod voting;

pub use engine::{
    EngineOptions, GovernanceEngine, GovernanceState, InitialDeposit, ProposalRequest,
    ProposalView,
};
pub use error::{GovernanceError, Result};
pub use events::Event;
pub use execution::{ActionHost, ExecutionOutcome, HostError, InMemoryHost};
pub use membership::{AddressList, GroupMembership, MembershipConfig, MembershipLedger, TokenBalance};
pub use proposal::{Action, Proposal, ProposalStatus, ProposalStore, Tally, VoteOption, VoteRecord};
pub use registry::{Group, GroupRegistry};
pub use settings::{AbstainPolicy, VotingMode, VotingSettings};
pub use voting::CastVote;

/// Governance configuration constants
pub mod config {
    /// Shortest allowed voting window (1 hour)
    pub const MIN_DURATION_LOWER_BOUND: u64 = 3600;

    /// Longest allowed voting window (365 days)
    pub const MIN_DURATION_UPPER_BOUND: u64 = 365 * 86_400;

    /// Action count limit, one bit of the failure map each
    pub const MAX_ACTIONS: usize = 256;

    /// How far in the past a proposal's start date may lie (seconds)
    pub const DEFAULT_START_GRACE_SECS: u64 = 60;
}

//! Notifications emitted by state-changing operations
//!
//! Events are buffered by the engine and only kept when the operation
//! that produced them commits.

use cohort_core::{Address, Amount, Asset, BlockNumber};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::membership::MembershipConfig;
use crate::proposal::{Action, VoteOption};
use crate::settings::VotingSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    GroupCreated {
        group_id: u64,
        name: String,
        membership: MembershipConfig,
        settings: VotingSettings,
        vault: Address,
    },
    MembersAdded {
        group_id: u64,
        members: Vec<Address>,
    },
    MembersRemoved {
        group_id: u64,
        members: Vec<Address>,
    },
    VotingSettingsUpdated {
        group_id: u64,
        settings: VotingSettings,
    },
    ProposalCreated {
        proposal_id: u64,
        group_id: u64,
        creator: Address,
        start_date: u64,
        end_date: u64,
        metadata: String,
        actions: Vec<Action>,
        allow_failure_map: U256,
    },
    VoteCast {
        proposal_id: u64,
        voter: Address,
        option: VoteOption,
        voting_power: Amount,
    },
    ProposalExecuted {
        proposal_id: u64,
        failure_map: U256,
    },
    Deposited {
        group_id: u64,
        from: Address,
        asset: Asset,
        amount: Amount,
        block: BlockNumber,
    },
    Withdrawal {
        group_id: u64,
        asset: Asset,
        amount: Amount,
        recipient: Address,
    },
}

impl Event {
    /// Short name used in logs and the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            Event::GroupCreated { .. } => "GroupCreated",
            Event::MembersAdded { .. } => "MembersAdded",
            Event::MembersRemoved { .. } => "MembersRemoved",
            Event::VotingSettingsUpdated { .. } => "VotingSettingsUpdated",
            Event::ProposalCreated { .. } => "ProposalCreated",
            Event::VoteCast { .. } => "VoteCast",
            Event::ProposalExecuted { .. } => "ProposalExecuted",
            Event::Deposited { .. } => "Deposited",
            Event::Withdrawal { .. } => "Withdrawal",
        }
    }
}

//! Proposal records and the proposal store
//!
//! Proposals are append-only: once stored they are never removed. The
//! voting engine mutates the tally and the execution engine flips the
//! `executed` flag; nothing else writes to a stored proposal.

use cohort_core::{Address, Amount, BlockNumber, Timestamp};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{GovernanceError, Result};
use crate::settings::{AbstainPolicy, VotingMode};

/// A call the group's vault makes when the proposal executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub target: Address,
    /// Native currency sent from the vault along with the call
    pub value: Amount,
    /// Opaque call data forwarded to the host
    pub payload: Vec<u8>,
}

impl Action {
    pub fn new(target: Address, value: Amount, payload: Vec<u8>) -> Self {
        Self {
            target,
            value,
            payload,
        }
    }

    /// Plain value transfer with no call data
    pub fn transfer(target: Address, value: Amount) -> Self {
        Self::new(target, value, Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOption {
    Abstain,
    Yes,
    No,
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOption::Abstain => write!(f, "abstain"),
            VoteOption::Yes => write!(f, "yes"),
            VoteOption::No => write!(f, "no"),
        }
    }
}

impl std::str::FromStr for VoteOption {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(VoteOption::Yes),
            "no" | "n" => Ok(VoteOption::No),
            "abstain" | "a" => Ok(VoteOption::Abstain),
            other => Err(format!("unknown vote option: {}", other)),
        }
    }
}

/// Vote totals in the group's voting-power unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    pub yes: Amount,
    pub no: Amount,
    pub abstain: Amount,
}

impl Tally {
    /// Sum of all cast voting power
    pub fn total(&self) -> Amount {
        self.yes
            .saturating_add(self.no)
            .saturating_add(self.abstain)
    }

    pub fn get(&self, option: VoteOption) -> Amount {
        match option {
            VoteOption::Yes => self.yes,
            VoteOption::No => self.no,
            VoteOption::Abstain => self.abstain,
        }
    }

    fn slot(&mut self, option: VoteOption) -> &mut Amount {
        match option {
            VoteOption::Yes => &mut self.yes,
            VoteOption::No => &mut self.no,
            VoteOption::Abstain => &mut self.abstain,
        }
    }

    pub(crate) fn add(&mut self, option: VoteOption, power: Amount) {
        let slot = self.slot(option);
        *slot = slot.saturating_add(power);
    }

    pub(crate) fn sub(&mut self, option: VoteOption, power: Amount) {
        let slot = self.slot(option);
        *slot = slot.saturating_sub(power);
    }
}

/// Parameters frozen when the proposal is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalParameters {
    pub voting_mode: VotingMode,
    pub support_threshold: u32,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub snapshot_block: BlockNumber,
    /// Participation needed, in voting power
    pub min_voting_power: Amount,
    pub abstain_policy: AbstainPolicy,
}

/// A member's live vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub option: VoteOption,
    pub voting_power: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Voting has not started
    Pending,
    /// Voting window open
    Active,
    /// Window closed, or the outcome is already guaranteed
    Decided,
    /// Actions have run
    Executed,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Active => "active",
            ProposalStatus::Decided => "decided",
            ProposalStatus::Executed => "executed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub group_id: u64,
    pub creator: Address,
    /// Opaque metadata pointer, never interpreted
    pub metadata: String,
    pub actions: Vec<Action>,
    /// Bit `i` set: action `i` may fail without aborting execution
    pub allow_failure_map: U256,
    pub parameters: ProposalParameters,
    /// Total voting power of the group at the snapshot block
    pub total_voting_power: Amount,
    pub tally: Tally,
    pub voters: BTreeMap<Address, VoteRecord>,
    pub executed: bool,
    /// Bit `i` set: action `i` failed and was skipped
    pub execution_failure_map: U256,
}

impl Proposal {
    /// Still accepting votes: started, not ended, not decided early, not run
    pub fn is_open(&self, now: Timestamp) -> bool {
        self.status(now) == ProposalStatus::Active
    }

    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.parameters.end_date
    }

    pub fn vote_of(&self, voter: &Address) -> Option<&VoteRecord> {
        self.voters.get(voter)
    }

    pub fn status(&self, now: Timestamp) -> ProposalStatus {
        if self.executed {
            ProposalStatus::Executed
        } else if now < self.parameters.start_date {
            ProposalStatus::Pending
        } else if self.has_ended(now) || self.is_decided_early() {
            ProposalStatus::Decided
        } else {
            ProposalStatus::Active
        }
    }

    pub fn allows_failure(&self, index: usize) -> bool {
        index < 256 && self.allow_failure_map.bit(index)
    }
}

/// Append-only proposal storage keyed by sequential id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStore {
    proposals: Vec<Proposal>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next stored proposal will get
    pub fn next_id(&self) -> u64 {
        self.proposals.len() as u64
    }

    /// Store `proposal`, which must carry `next_id()`
    pub(crate) fn push(&mut self, proposal: Proposal) -> u64 {
        debug_assert_eq!(proposal.id, self.next_id());
        let id = proposal.id;
        self.proposals.push(proposal);
        id
    }

    pub fn get(&self, id: u64) -> Result<&Proposal> {
        self.proposals
            .get(id as usize)
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Result<&mut Proposal> {
        self.proposals
            .get_mut(id as usize)
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    pub fn count(&self) -> u64 {
        self.proposals.len() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter()
    }

    pub fn by_group(&self, group_id: u64) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter().filter(move |p| p.group_id == group_id)
    }

    /// Rebuild a store from persisted records, ordered by id
    pub fn from_records(mut records: Vec<Proposal>) -> Result<Self> {
        records.sort_by_key(|p| p.id);
        for (index, proposal) in records.iter().enumerate() {
            if proposal.id != index as u64 {
                return Err(GovernanceError::ProposalNotFound(index as u64));
            }
        }
        Ok(Self { proposals: records })
    }
}

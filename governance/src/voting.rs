//! Voting Engine
//!
//! Threshold arithmetic and vote application. All ratio comparisons are
//! done cross-multiplied in 256-bit integers:
//!
//! - support: `(RATIO_BASE - threshold) * yes > threshold * no`
//! - early support: same, with every vote that could still turn into a
//!   "no" counted as one
//! - participation: `yes + no + abstain >= min_voting_power`

use cohort_core::ratio::weighted_gt;
use cohort_core::{Address, Amount, Timestamp, RATIO_BASE};

use crate::error::{GovernanceError, Result};
use crate::membership::MembershipLedger;
use crate::proposal::{Proposal, ProposalStatus, VoteOption, VoteRecord};
use crate::settings::{AbstainPolicy, VotingMode};

/// `yes / (yes + no) > threshold`, strictly. No votes at all never passes.
pub fn support_reached(threshold: u32, yes: Amount, no: Amount) -> bool {
    weighted_gt(RATIO_BASE - threshold, yes, threshold, no)
}

/// Worst-case "no" bucket: every bit of power that has not voted, plus
/// abstentions when the policy says they may still flip.
pub fn worst_case_no(
    total_voting_power: Amount,
    yes: Amount,
    no: Amount,
    abstain: Amount,
    policy: AbstainPolicy,
) -> Amount {
    let remaining = total_voting_power
        .saturating_sub(yes)
        .saturating_sub(no)
        .saturating_sub(abstain);
    match policy {
        AbstainPolicy::Final => no.saturating_add(remaining),
        AbstainPolicy::Reversible => no.saturating_add(remaining).saturating_add(abstain),
    }
}

/// Outcome of applying one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastVote {
    pub voting_power: Amount,
    pub replaced: Option<VoteOption>,
}

impl Proposal {
    pub fn is_support_threshold_reached(&self) -> bool {
        support_reached(
            self.parameters.support_threshold,
            self.tally.yes,
            self.tally.no,
        )
    }

    /// Support holds even if every outstanding vote goes "no"
    pub fn is_support_threshold_reached_early(&self) -> bool {
        let worst_no = worst_case_no(
            self.total_voting_power,
            self.tally.yes,
            self.tally.no,
            self.tally.abstain,
            self.parameters.abstain_policy,
        );
        support_reached(self.parameters.support_threshold, self.tally.yes, worst_no)
    }

    pub fn is_min_participation_reached(&self) -> bool {
        self.tally.total() >= self.parameters.min_voting_power
    }

    /// Early-execution mode and the result can no longer change
    pub fn is_decided_early(&self) -> bool {
        self.parameters.voting_mode == VotingMode::EarlyExecution
            && self.is_support_threshold_reached_early()
            && self.is_min_participation_reached()
    }

    pub fn can_execute(&self, now: Timestamp) -> bool {
        if self.executed {
            return false;
        }
        if self.has_ended(now) {
            return self.is_support_threshold_reached() && self.is_min_participation_reached();
        }
        self.parameters.start_date <= now && self.is_decided_early()
    }

    /// Whether `voter` could vote right now. Every option is treated alike;
    /// under replacement a repeat of the current option is still a vote.
    pub fn can_vote(
        &self,
        ledger: &dyn MembershipLedger,
        voter: &Address,
        _option: VoteOption,
        now: Timestamp,
    ) -> Result<bool> {
        if self.status(now) != ProposalStatus::Active {
            return Ok(false);
        }
        if ledger.voting_power_of(voter, self.parameters.snapshot_block)? == 0 {
            return Ok(false);
        }
        Ok(!self.voters.contains_key(voter)
            || self.parameters.voting_mode == VotingMode::VoteReplacement)
    }

    /// Record `voter`'s vote, moving power between options on replacement.
    pub(crate) fn apply_vote(
        &mut self,
        ledger: &dyn MembershipLedger,
        voter: &Address,
        option: VoteOption,
        now: Timestamp,
    ) -> Result<CastVote> {
        let forbidden = || GovernanceError::VoteCastForbidden {
            proposal_id: self.id,
            account: *voter,
            option,
        };

        if !self.can_vote(ledger, voter, option, now)? {
            return Err(forbidden());
        }
        let voting_power = ledger.voting_power_of(voter, self.parameters.snapshot_block)?;

        let mut tally = self.tally;
        let replaced = self.voters.get(voter).map(|previous| {
            tally.sub(previous.option, previous.voting_power);
            previous.option
        });
        tally.add(option, voting_power);

        // Holds for a consistent ledger; an oracle reporting balances above
        // its own supply is refused rather than recorded.
        if tally.total() > self.total_voting_power {
            return Err(forbidden());
        }

        self.tally = tally;
        self.voters.insert(
            *voter,
            VoteRecord {
                option,
                voting_power,
            },
        );
        Ok(CastVote {
            voting_power,
            replaced,
        })
    }
}

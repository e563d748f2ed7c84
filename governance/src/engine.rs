//! Governance engine
//!
//! Facade over the registry, proposal store, voting and execution engines.
//! Every mutating entry point runs as one transaction: the engine works on
//! a staged copy of its state and a host savepoint, and commits both or
//! neither. Events produced by a reverted operation are dropped with it.

use cohort_core::{
    apply_ratio_ceiled, Address, Amount, Asset, BlockContext, BlockNumber, Capability, Permission,
    Scope, Timestamp, TokenOracle,
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use treasury::GroupVault;

use crate::config;
use crate::error::{GovernanceError, Result};
use crate::events::Event;
use crate::execution::{self, ActionHost, ExecutionOutcome};
use crate::membership::{GroupMembership, MembershipConfig};
use crate::proposal::{
    Action, Proposal, ProposalParameters, ProposalStatus, ProposalStore, Tally, VoteOption,
};
use crate::registry::{Group, GroupRegistry};
use crate::settings::VotingSettings;
use crate::voting::CastVote;

/// Everything the engine persists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceState {
    pub registry: GroupRegistry,
    pub proposals: ProposalStore,
    /// Last block context a transaction committed at
    pub clock: BlockContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// How far in the past a proposal may start (seconds)
    pub start_grace_secs: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            start_grace_secs: config::DEFAULT_START_GRACE_SECS,
        }
    }
}

/// Funds to move into a new group's vault at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialDeposit {
    pub from: Address,
    pub asset: Asset,
    pub amount: Amount,
}

/// Arguments to `create_proposal`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalRequest {
    pub group_id: u64,
    pub metadata: String,
    pub actions: Vec<Action>,
    pub allow_failure_map: U256,
    /// Zero starts voting now
    pub start_date: Timestamp,
    /// Zero ends voting after the group's minimum duration
    pub end_date: Timestamp,
    pub creator_vote: Option<VoteOption>,
    pub try_early_execution: bool,
}

/// Read-only view of a proposal at a given time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalView {
    pub id: u64,
    pub group_id: u64,
    pub creator: Address,
    pub metadata: String,
    pub open: bool,
    pub executed: bool,
    pub status: ProposalStatus,
    pub parameters: ProposalParameters,
    pub total_voting_power: Amount,
    pub tally: Tally,
    pub actions: Vec<Action>,
    pub allow_failure_map: U256,
    pub execution_failure_map: U256,
}

impl ProposalView {
    fn new(proposal: &Proposal, now: Timestamp) -> Self {
        Self {
            id: proposal.id,
            group_id: proposal.group_id,
            creator: proposal.creator,
            metadata: proposal.metadata.clone(),
            open: proposal.is_open(now),
            executed: proposal.executed,
            status: proposal.status(now),
            parameters: proposal.parameters.clone(),
            total_voting_power: proposal.total_voting_power,
            tally: proposal.tally,
            actions: proposal.actions.clone(),
            allow_failure_map: proposal.allow_failure_map,
            execution_failure_map: proposal.execution_failure_map,
        }
    }
}

pub struct GovernanceEngine<T: TokenOracle, H: ActionHost> {
    state: GovernanceState,
    tokens: T,
    host: H,
    options: EngineOptions,
    events: Vec<Event>,
}

/// One in-flight operation over staged state
struct Txn<'a, T: TokenOracle, H: ActionHost> {
    state: &'a mut GovernanceState,
    tokens: &'a T,
    host: &'a mut H,
    options: &'a EngineOptions,
    ctx: BlockContext,
    events: Vec<Event>,
}

impl<T: TokenOracle, H: ActionHost> GovernanceEngine<T, H> {
    pub fn new(tokens: T, host: H, options: EngineOptions) -> Self {
        Self::from_state(GovernanceState::default(), tokens, host, options)
    }

    /// Resume from persisted state
    pub fn from_state(state: GovernanceState, tokens: T, host: H, options: EngineOptions) -> Self {
        Self {
            state,
            tokens,
            host,
            options,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &GovernanceState {
        &self.state
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    /// The token oracle is external; changes to it are not transactional.
    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn into_parts(self) -> (GovernanceState, T, H) {
        (self.state, self.tokens, self.host)
    }

    /// Drain events from committed operations
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn transact<R>(
        &mut self,
        ctx: &BlockContext,
        op: impl FnOnce(&mut Txn<'_, T, H>) -> Result<R>,
    ) -> Result<R> {
        if !ctx.follows(&self.state.clock) {
            log::warn!(
                "⚠️  Rejected block context {:?}, last committed {:?}",
                ctx,
                self.state.clock
            );
            return Err(GovernanceError::ClockRegression {
                last: self.state.clock,
                given: *ctx,
            });
        }

        let mut staged = self.state.clone();
        let savepoint = self.host.savepoint();
        let mut txn = Txn {
            state: &mut staged,
            tokens: &self.tokens,
            host: &mut self.host,
            options: &self.options,
            ctx: *ctx,
            events: Vec::new(),
        };
        let result = op(&mut txn);
        let events = std::mem::take(&mut txn.events);

        match result {
            Ok(value) => {
                staged.clock = *ctx;
                self.state = staged;
                self.host.release(savepoint);
                self.events.extend(events);
                Ok(value)
            }
            Err(e) => {
                self.host.rollback_to(savepoint);
                log::debug!("Operation reverted at block {}: {}", ctx.number, e);
                Err(e)
            }
        }
    }

    // Writes

    /// Create a group with its own vault. Needs `CreateGroup` on the organization.
    pub fn create_group(
        &mut self,
        cap: &Capability,
        ctx: &BlockContext,
        name: impl Into<String>,
        membership: MembershipConfig,
        settings: VotingSettings,
        initial_deposit: Option<InitialDeposit>,
    ) -> Result<u64> {
        let name = name.into();
        self.transact(ctx, |txn| {
            txn.create_group(cap, name, membership, settings, initial_deposit)
        })
    }

    pub fn add_addresses(
        &mut self,
        cap: &Capability,
        ctx: &BlockContext,
        group_id: u64,
        accounts: &[Address],
    ) -> Result<()> {
        self.transact(ctx, |txn| txn.change_members(cap, group_id, accounts, true))
    }

    pub fn remove_addresses(
        &mut self,
        cap: &Capability,
        ctx: &BlockContext,
        group_id: u64,
        accounts: &[Address],
    ) -> Result<()> {
        self.transact(ctx, |txn| txn.change_members(cap, group_id, accounts, false))
    }

    /// Replace a group's voting settings. Existing proposals keep theirs.
    pub fn update_voting_settings(
        &mut self,
        cap: &Capability,
        ctx: &BlockContext,
        group_id: u64,
        settings: VotingSettings,
    ) -> Result<()> {
        self.transact(ctx, |txn| txn.update_voting_settings(cap, group_id, settings))
    }

    pub fn create_proposal(
        &mut self,
        ctx: &BlockContext,
        creator: Address,
        request: ProposalRequest,
    ) -> Result<u64> {
        self.transact(ctx, |txn| txn.create_proposal(creator, request))
    }

    pub fn vote(
        &mut self,
        ctx: &BlockContext,
        voter: Address,
        proposal_id: u64,
        option: VoteOption,
        try_early_execution: bool,
    ) -> Result<CastVote> {
        self.transact(ctx, |txn| {
            txn.cast_vote(voter, proposal_id, option, try_early_execution)
        })
    }

    /// Run a decided proposal. Anyone may call it.
    pub fn execute(&mut self, ctx: &BlockContext, proposal_id: u64) -> Result<ExecutionOutcome> {
        self.transact(ctx, |txn| txn.execute(proposal_id))
    }

    pub fn withdraw(
        &mut self,
        cap: &Capability,
        ctx: &BlockContext,
        group_id: u64,
        asset: Asset,
        amount: Amount,
        recipient: Address,
    ) -> Result<()> {
        self.transact(ctx, |txn| txn.withdraw(cap, group_id, asset, amount, recipient))
    }

    /// Move funds from `from` into the group's vault through the host
    pub fn deposit(
        &mut self,
        ctx: &BlockContext,
        group_id: u64,
        from: Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<()> {
        self.transact(ctx, |txn| {
            let vault = *txn.state.registry.vault(group_id)?.address();
            txn.host
                .pull(&from, &vault, asset, amount)
                .map_err(|e| GovernanceError::HostTransferFailed(e.to_string()))?;
            txn.record_deposit(group_id, from, asset, amount)
        })
    }

    /// Book a transfer the host already delivered to the vault
    pub fn record_deposit(
        &mut self,
        ctx: &BlockContext,
        group_id: u64,
        from: Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<()> {
        self.transact(ctx, |txn| txn.record_deposit(group_id, from, asset, amount))
    }

    /// Move the engine clock forward without any other change
    pub fn advance_clock(&mut self, ctx: &BlockContext) -> Result<()> {
        self.transact(ctx, |_| Ok(()))
    }

    // Reads

    pub fn get_proposal(&self, proposal_id: u64, now: Timestamp) -> Result<ProposalView> {
        Ok(ProposalView::new(self.state.proposals.get(proposal_id)?, now))
    }

    pub fn proposal(&self, proposal_id: u64) -> Result<&Proposal> {
        self.state.proposals.get(proposal_id)
    }

    pub fn can_vote(
        &self,
        proposal_id: u64,
        voter: &Address,
        option: VoteOption,
        now: Timestamp,
    ) -> Result<bool> {
        let proposal = self.state.proposals.get(proposal_id)?;
        let group = self.state.registry.group(proposal.group_id)?;
        let ledger = group.membership.ledger(&self.tokens);
        proposal.can_vote(&*ledger, voter, option, now)
    }

    pub fn can_execute(&self, proposal_id: u64, now: Timestamp) -> Result<bool> {
        Ok(self.state.proposals.get(proposal_id)?.can_execute(now))
    }

    pub fn is_support_threshold_reached(&self, proposal_id: u64) -> Result<bool> {
        Ok(self
            .state
            .proposals
            .get(proposal_id)?
            .is_support_threshold_reached())
    }

    pub fn is_support_threshold_reached_early(&self, proposal_id: u64) -> Result<bool> {
        Ok(self
            .state
            .proposals
            .get(proposal_id)?
            .is_support_threshold_reached_early())
    }

    pub fn is_min_participation_reached(&self, proposal_id: u64) -> Result<bool> {
        Ok(self
            .state
            .proposals
            .get(proposal_id)?
            .is_min_participation_reached())
    }

    pub fn get_vote(&self, proposal_id: u64, voter: &Address) -> Result<Option<VoteOption>> {
        Ok(self
            .state
            .proposals
            .get(proposal_id)?
            .vote_of(voter)
            .map(|record| record.option))
    }

    /// Address-list membership at a past or current block
    pub fn is_listed_at_block(
        &self,
        group_id: u64,
        account: &Address,
        block: BlockNumber,
    ) -> Result<bool> {
        let group = self.state.registry.group(group_id)?;
        group
            .membership
            .address_list()
            .map(|list| list.is_listed_at(account, block))
            .ok_or(GovernanceError::NotAddressList(group_id))
    }

    pub fn is_eligible(&self, group_id: u64, account: &Address, block: BlockNumber) -> Result<bool> {
        let group = self.state.registry.group(group_id)?;
        group.membership.ledger(&self.tokens).is_eligible(account, block)
    }

    pub fn voting_power_of(
        &self,
        group_id: u64,
        account: &Address,
        block: BlockNumber,
    ) -> Result<Amount> {
        let group = self.state.registry.group(group_id)?;
        group
            .membership
            .ledger(&self.tokens)
            .voting_power_of(account, block)
    }

    pub fn total_voting_power(&self, group_id: u64, block: BlockNumber) -> Result<Amount> {
        let group = self.state.registry.group(group_id)?;
        group.membership.ledger(&self.tokens).total_voting_power(block)
    }

    pub fn group(&self, group_id: u64) -> Result<&Group> {
        self.state.registry.group(group_id)
    }

    pub fn vault(&self, group_id: u64) -> Result<&GroupVault> {
        self.state.registry.vault(group_id)
    }

    pub fn vault_balance(&self, group_id: u64, asset: &Asset) -> Result<Amount> {
        Ok(self.state.registry.vault(group_id)?.balance(asset))
    }

    pub fn group_count(&self) -> u64 {
        self.state.registry.count()
    }

    pub fn proposal_count(&self) -> u64 {
        self.state.proposals.count()
    }
}

impl<T: TokenOracle, H: ActionHost> Txn<'_, T, H> {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    fn create_group(
        &mut self,
        cap: &Capability,
        name: String,
        membership: MembershipConfig,
        settings: VotingSettings,
        initial_deposit: Option<InitialDeposit>,
    ) -> Result<u64> {
        cap.require(Scope::Organization, Permission::CreateGroup)?;
        settings.validate()?;

        let bound = GroupMembership::from_config(membership.clone(), self.tokens, self.ctx.number)?;
        let mode = bound.mode_name();
        let group_id = self
            .state
            .registry
            .create(name.clone(), bound, settings.clone(), self.ctx.number);
        let vault = *self.state.registry.vault(group_id)?.address();

        log::info!(
            "🏛️  Group {} '{}' created ({}), vault {}",
            group_id,
            name,
            mode,
            vault
        );
        self.emit(Event::GroupCreated {
            group_id,
            name,
            membership,
            settings,
            vault,
        });

        if let Some(deposit) = initial_deposit {
            self.host
                .pull(&deposit.from, &vault, deposit.asset, deposit.amount)
                .map_err(|e| GovernanceError::InitialDepositFailed(e.to_string()))?;
            self.record_deposit(group_id, deposit.from, deposit.asset, deposit.amount)?;
        }
        Ok(group_id)
    }

    fn change_members(
        &mut self,
        cap: &Capability,
        group_id: u64,
        accounts: &[Address],
        add: bool,
    ) -> Result<()> {
        cap.require(Scope::Group(group_id), Permission::ManageMembership)?;
        let block = self.ctx.number;
        let list = self
            .state
            .registry
            .group_mut(group_id)?
            .membership
            .address_list_mut()
            .ok_or(GovernanceError::NotAddressList(group_id))?;

        let members = accounts.to_vec();
        if add {
            list.add(accounts, block)?;
            log::info!("👥 Added {} member(s) to group {}", accounts.len(), group_id);
            self.emit(Event::MembersAdded { group_id, members });
        } else {
            list.remove(accounts, block)?;
            log::info!("👥 Removed {} member(s) from group {}", accounts.len(), group_id);
            self.emit(Event::MembersRemoved { group_id, members });
        }
        Ok(())
    }

    fn update_voting_settings(
        &mut self,
        cap: &Capability,
        group_id: u64,
        settings: VotingSettings,
    ) -> Result<()> {
        cap.require(Scope::Group(group_id), Permission::UpdateVotingSettings)?;
        settings.validate()?;
        self.state.registry.group_mut(group_id)?.settings = settings.clone();
        log::info!("⚙️  Voting settings of group {} updated", group_id);
        self.emit(Event::VotingSettingsUpdated { group_id, settings });
        Ok(())
    }

    fn create_proposal(&mut self, creator: Address, request: ProposalRequest) -> Result<u64> {
        let ProposalRequest {
            group_id,
            metadata,
            actions,
            allow_failure_map,
            start_date,
            end_date,
            creator_vote,
            try_early_execution,
        } = request;

        if actions.len() > config::MAX_ACTIONS {
            return Err(GovernanceError::TooManyActions {
                limit: config::MAX_ACTIONS,
                actual: actions.len(),
            });
        }

        let now = self.ctx.timestamp;
        // Never the current block: same-block balance changes must not count.
        let snapshot_block = self.ctx.number.saturating_sub(1);

        let group = self.state.registry.group(group_id)?;
        let settings = group.settings.clone();
        let total_voting_power = {
            let ledger = group.membership.ledger(self.tokens);
            if !ledger.can_propose(&creator, self.ctx.number, settings.min_proposer_voting_power)? {
                log::warn!("⚠️  {} may not propose in group {}", creator, group_id);
                return Err(GovernanceError::ProposalCreationForbidden { account: creator });
            }
            ledger.total_voting_power(snapshot_block)?
        };
        if total_voting_power == 0 {
            return Err(GovernanceError::NoVotingPower {
                group_id,
                block: snapshot_block,
            });
        }

        let start_date = if start_date == 0 { now } else { start_date };
        let earliest = now.saturating_sub(self.options.start_grace_secs);
        if start_date < earliest {
            return Err(GovernanceError::DateOutOfBounds {
                limit: earliest,
                actual: start_date,
            });
        }
        let end_date = if end_date == 0 {
            start_date.saturating_add(settings.min_duration)
        } else {
            end_date
        };
        let duration = end_date.saturating_sub(start_date);
        if duration < settings.min_duration {
            return Err(GovernanceError::MinDurationOutOfBounds {
                limit: settings.min_duration,
                actual: duration,
            });
        }

        let min_voting_power = apply_ratio_ceiled(total_voting_power, settings.min_participation);
        let proposal_id = self.state.proposals.next_id();
        let proposal = Proposal {
            id: proposal_id,
            group_id,
            creator,
            metadata: metadata.clone(),
            actions: actions.clone(),
            allow_failure_map,
            parameters: ProposalParameters {
                voting_mode: settings.voting_mode,
                support_threshold: settings.support_threshold,
                start_date,
                end_date,
                snapshot_block,
                min_voting_power,
                abstain_policy: settings.abstain_policy,
            },
            total_voting_power,
            tally: Tally::default(),
            voters: Default::default(),
            executed: false,
            execution_failure_map: U256::zero(),
        };
        self.state.proposals.push(proposal);

        log::info!(
            "📝 Proposal {} created in group {} by {} (voting {}..{}, snapshot block {})",
            proposal_id,
            group_id,
            creator,
            start_date,
            end_date,
            snapshot_block
        );
        self.emit(Event::ProposalCreated {
            proposal_id,
            group_id,
            creator,
            start_date,
            end_date,
            metadata,
            actions,
            allow_failure_map,
        });

        if let Some(option) = creator_vote {
            self.cast_vote(creator, proposal_id, option, try_early_execution)?;
        }
        Ok(proposal_id)
    }

    fn cast_vote(
        &mut self,
        voter: Address,
        proposal_id: u64,
        option: VoteOption,
        try_early_execution: bool,
    ) -> Result<CastVote> {
        let now = self.ctx.timestamp;
        let group_id = self.state.proposals.get(proposal_id)?.group_id;
        let group = self.state.registry.group(group_id)?;
        let proposal = self.state.proposals.get_mut(proposal_id)?;

        let cast = {
            let ledger = group.membership.ledger(self.tokens);
            proposal.apply_vote(&*ledger, &voter, option, now)?
        };
        log::debug!(
            "Proposal {} tally yes={} no={} abstain={} of {}",
            proposal_id,
            proposal.tally.yes,
            proposal.tally.no,
            proposal.tally.abstain,
            proposal.total_voting_power
        );
        let executable = try_early_execution && proposal.can_execute(now);

        log::info!(
            "🗳️  {} voted {} on proposal {} with power {}",
            voter,
            option,
            proposal_id,
            cast.voting_power
        );
        self.emit(Event::VoteCast {
            proposal_id,
            voter,
            option,
            voting_power: cast.voting_power,
        });

        if executable {
            self.execute(proposal_id)?;
        }
        Ok(cast)
    }

    fn execute(&mut self, proposal_id: u64) -> Result<ExecutionOutcome> {
        let proposal = self.state.proposals.get_mut(proposal_id)?;
        let vault = self.state.registry.vault_mut(proposal.group_id)?;
        let outcome = execution::execute(proposal, vault, &mut *self.host, &self.ctx)?;

        log::info!(
            "✅ Proposal {} executed ({} action(s), failure map {:#x})",
            proposal_id,
            outcome.results.len(),
            outcome.failure_map
        );
        self.emit(Event::ProposalExecuted {
            proposal_id,
            failure_map: outcome.failure_map,
        });
        Ok(outcome)
    }

    fn withdraw(
        &mut self,
        cap: &Capability,
        group_id: u64,
        asset: Asset,
        amount: Amount,
        recipient: Address,
    ) -> Result<()> {
        cap.require(Scope::Group(group_id), Permission::Withdraw)?;
        let block = self.ctx.number;
        let vault = self.state.registry.vault_mut(group_id)?;
        vault.withdraw(cap, asset, amount, recipient, block)?;
        let from = *vault.address();
        self.host
            .push(&from, &recipient, asset, amount)
            .map_err(|e| GovernanceError::HostTransferFailed(e.to_string()))?;

        self.emit(Event::Withdrawal {
            group_id,
            asset,
            amount,
            recipient,
        });
        Ok(())
    }

    fn record_deposit(
        &mut self,
        group_id: u64,
        from: Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<()> {
        let block = self.ctx.number;
        self.state
            .registry
            .vault_mut(group_id)?
            .deposit(asset, amount, from, block)?;
        log::info!(
            "💰 Group {} vault received {} {} from {}",
            group_id,
            amount,
            asset,
            from
        );
        self.emit(Event::Deposited {
            group_id,
            from,
            asset,
            amount,
            block,
        });
        Ok(())
    }
}

//! Execution Engine
//!
//! Runs a decided proposal's actions from its group vault. The proposal is
//! marked executed before the first action is dispatched, so a re-entrant
//! `execute` sees it as already done. Atomicity across the whole call is
//! provided by the engine's transaction: if a non-allow-listed action fails,
//! the error unwinds the executed flag, every vault debit and every host
//! effect together.

use cohort_core::{Address, Amount, Asset, BlockContext};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use treasury::GroupVault;

use crate::error::{GovernanceError, Result};
use crate::proposal::{Action, Proposal};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

/// The chain the core runs on.
///
/// The host moves real assets and dispatches calls; the core keeps the
/// vault bookkeeping. Savepoints let the core undo host effects when an
/// operation reverts.
pub trait ActionHost {
    /// Dispatch `action` from `from`. The vault has already been debited
    /// for `action.value`.
    fn call(&mut self, from: &Address, action: &Action) -> std::result::Result<Vec<u8>, HostError>;

    /// Move `amount` of `asset` from `from` into `to`, failing if `from`
    /// has not made the funds available.
    fn pull(
        &mut self,
        from: &Address,
        to: &Address,
        asset: Asset,
        amount: Amount,
    ) -> std::result::Result<(), HostError>;

    /// Pay out `amount` of `asset` held at `from` to `to`.
    fn push(
        &mut self,
        from: &Address,
        to: &Address,
        asset: Asset,
        amount: Amount,
    ) -> std::result::Result<(), HostError>;

    fn savepoint(&mut self) -> usize;

    /// Undo every effect recorded after `savepoint`
    fn rollback_to(&mut self, savepoint: usize);

    /// Keep the effects recorded after `savepoint`
    fn release(&mut self, savepoint: usize);
}

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Return data per action; `None` for actions that failed and were skipped
    pub results: Vec<Option<Vec<u8>>>,
    /// Bit `i` set: action `i` failed and was allowed to
    pub failure_map: U256,
}

/// Run `proposal`'s actions against `vault` and `host`.
pub fn execute(
    proposal: &mut Proposal,
    vault: &mut GroupVault,
    host: &mut dyn ActionHost,
    ctx: &BlockContext,
) -> Result<ExecutionOutcome> {
    if !proposal.can_execute(ctx.timestamp) {
        log::warn!("⚠️  Proposal {} is not executable", proposal.id);
        return Err(GovernanceError::ProposalExecutionForbidden {
            proposal_id: proposal.id,
        });
    }

    // State before effects.
    proposal.executed = true;

    let vault_address = *vault.address();
    let mut results = Vec::with_capacity(proposal.actions.len());
    let mut failure_map = U256::zero();

    for (index, action) in proposal.actions.iter().enumerate() {
        let allowed = proposal.allows_failure(index);
        let savepoint = host.savepoint();

        match dispatch(proposal.id, index, action, vault, host, &vault_address, ctx) {
            Ok(data) => {
                host.release(savepoint);
                results.push(Some(data));
            }
            Err(reason) if allowed => {
                host.rollback_to(savepoint);
                log::debug!(
                    "Proposal {} action {} failed and was skipped: {}",
                    proposal.id,
                    index,
                    reason
                );
                failure_map |= U256::one() << index;
                results.push(None);
            }
            Err(reason) => {
                host.rollback_to(savepoint);
                return Err(GovernanceError::ActionFailed { index, reason });
            }
        }
    }

    proposal.execution_failure_map = failure_map;
    Ok(ExecutionOutcome {
        results,
        failure_map,
    })
}

fn dispatch(
    proposal_id: u64,
    index: usize,
    action: &Action,
    vault: &mut GroupVault,
    host: &mut dyn ActionHost,
    vault_address: &Address,
    ctx: &BlockContext,
) -> std::result::Result<Vec<u8>, String> {
    if action.value > 0 {
        vault
            .transfer_for_action(
                proposal_id,
                index,
                Asset::Native,
                action.value,
                action.target,
                ctx.number,
            )
            .map_err(|e| e.to_string())?;
    }

    match host.call(vault_address, action) {
        Ok(data) => Ok(data),
        Err(e) => {
            if action.value > 0 {
                vault
                    .refund_action(proposal_id, index, Asset::Native, action.value, ctx.number)
                    .map_err(|e| e.to_string())?;
            }
            Err(e.to_string())
        }
    }
}

/// One dispatched call, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub from: Address,
    pub target: Address,
    pub value: Amount,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum HostOp {
    Credit { account: Address, asset: Asset, amount: Amount },
    Debit { account: Address, asset: Asset, amount: Amount },
    Call,
}

/// Account-balance host with an undo log, used by the CLI and tests.
///
/// Calls to a target in `failing_targets` fail; every other call succeeds
/// and credits `action.value` to the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryHost {
    balances: HashMap<Address, Vec<(Asset, Amount)>>,
    calls: Vec<CallRecord>,
    failing_targets: HashSet<Address>,
    #[serde(skip)]
    undo: Vec<HostOp>,
    #[serde(skip)]
    open_savepoints: usize,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &Address, asset: &Asset) -> Amount {
        self.balances
            .get(account)
            .and_then(|entries| entries.iter().find(|(a, _)| a == asset))
            .map(|(_, amount)| *amount)
            .unwrap_or(0)
    }

    /// Give `account` funds out of thin air (test and CLI faucet)
    pub fn fund(&mut self, account: Address, asset: Asset, amount: Amount) {
        self.credit(account, asset, amount);
        if self.open_savepoints == 0 {
            self.undo.clear();
        }
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn fail_calls_to(&mut self, target: Address) {
        self.failing_targets.insert(target);
    }

    /// History is only needed while some savepoint is open.
    fn close_savepoint(&mut self) {
        self.open_savepoints = self.open_savepoints.saturating_sub(1);
        if self.open_savepoints == 0 {
            self.undo.clear();
        }
    }

    fn set_balance(&mut self, account: Address, asset: Asset, amount: Amount) {
        let entries = self.balances.entry(account).or_default();
        match entries.iter_mut().find(|(a, _)| *a == asset) {
            Some(entry) => entry.1 = amount,
            None => entries.push((asset, amount)),
        }
    }

    fn credit(&mut self, account: Address, asset: Asset, amount: Amount) {
        let balance = self.balance(&account, &asset).saturating_add(amount);
        self.set_balance(account, asset, balance);
        self.undo.push(HostOp::Credit {
            account,
            asset,
            amount,
        });
    }

    fn debit(&mut self, account: Address, asset: Asset, amount: Amount) -> std::result::Result<(), HostError> {
        let available = self.balance(&account, &asset);
        if amount > available {
            return Err(HostError(format!(
                "{} holds {} {}, needs {}",
                account, available, asset, amount
            )));
        }
        self.set_balance(account, asset, available - amount);
        self.undo.push(HostOp::Debit {
            account,
            asset,
            amount,
        });
        Ok(())
    }
}

impl ActionHost for InMemoryHost {
    fn call(&mut self, from: &Address, action: &Action) -> std::result::Result<Vec<u8>, HostError> {
        if self.failing_targets.contains(&action.target) {
            return Err(HostError(format!("call to {} reverted", action.target)));
        }
        if action.value > 0 {
            self.debit(*from, Asset::Native, action.value)?;
            self.credit(action.target, Asset::Native, action.value);
        }
        self.calls.push(CallRecord {
            from: *from,
            target: action.target,
            value: action.value,
            payload: action.payload.clone(),
        });
        self.undo.push(HostOp::Call);
        Ok(Vec::new())
    }

    fn pull(
        &mut self,
        from: &Address,
        to: &Address,
        asset: Asset,
        amount: Amount,
    ) -> std::result::Result<(), HostError> {
        self.debit(*from, asset, amount)?;
        self.credit(*to, asset, amount);
        Ok(())
    }

    fn push(
        &mut self,
        from: &Address,
        to: &Address,
        asset: Asset,
        amount: Amount,
    ) -> std::result::Result<(), HostError> {
        self.debit(*from, asset, amount)?;
        self.credit(*to, asset, amount);
        Ok(())
    }

    fn savepoint(&mut self) -> usize {
        self.open_savepoints += 1;
        self.undo.len()
    }

    fn rollback_to(&mut self, savepoint: usize) {
        while self.undo.len() > savepoint {
            match self.undo.pop() {
                Some(HostOp::Credit {
                    account,
                    asset,
                    amount,
                }) => {
                    let balance = self.balance(&account, &asset).saturating_sub(amount);
                    self.set_balance(account, asset, balance);
                }
                Some(HostOp::Debit {
                    account,
                    asset,
                    amount,
                }) => {
                    let balance = self.balance(&account, &asset).saturating_add(amount);
                    self.set_balance(account, asset, balance);
                }
                Some(HostOp::Call) => {
                    self.calls.pop();
                }
                None => break,
            }
        }
        self.close_savepoint();
    }

    fn release(&mut self, _savepoint: usize) {
        self.close_savepoint();
    }
}

//! Group Vault
//!
//! Each group owns an isolated custody account. The vault keeps the
//! bookkeeping for assets the host holds at the vault address:
//! - deposits observed by the host (out-of-band transfers)
//! - permissioned withdrawals
//! - transfers triggered by executed proposal actions
//!
//! Every debit checks the balance before touching it, so a balance can
//! never be observed below zero.

use cohort_core::{Address, Amount, Asset, BlockNumber, Capability, Permission, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, VaultError};

/// Domain tag for vault address derivation
pub const VAULT_DOMAIN: &str = "COHORT_GROUP_VAULT_V1";

/// Why a balance changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEntryKind {
    Deposit { from: Address },
    Withdrawal { recipient: Address, authorized_by: Address },
    ActionTransfer { proposal_id: u64, action_index: usize, target: Address },
    /// Compensating credit for an action transfer the host rejected
    ActionRefund { proposal_id: u64, action_index: usize },
}

/// One line of the vault's audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub kind: VaultEntryKind,
    pub asset: Asset,
    pub amount: Amount,
    pub block: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVault {
    group_id: u64,
    address: Address,
    balances: BTreeMap<Asset, Amount>,
    entries: Vec<VaultEntry>,
}

impl GroupVault {
    /// Create an empty vault bound to `group_id`
    pub fn new(group_id: u64) -> Self {
        Self {
            group_id,
            address: Address::derive(VAULT_DOMAIN, &group_id.to_be_bytes()),
            balances: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    /// Address the host holds the vault's assets at
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn balance(&self, asset: &Asset) -> Amount {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// All non-zero balances
    pub fn balances(&self) -> impl Iterator<Item = (&Asset, &Amount)> {
        self.balances.iter().filter(|(_, amount)| **amount > 0)
    }

    pub fn entries(&self) -> &[VaultEntry] {
        &self.entries
    }

    /// Record an inbound transfer the host observed
    pub fn deposit(
        &mut self,
        asset: Asset,
        amount: Amount,
        from: Address,
        block: BlockNumber,
    ) -> Result<()> {
        self.credit(asset, amount, VaultEntryKind::Deposit { from }, block)
    }

    /// Permissioned withdrawal to `recipient`.
    ///
    /// The capability must grant `Withdraw` on this vault's group.
    pub fn withdraw(
        &mut self,
        cap: &Capability,
        asset: Asset,
        amount: Amount,
        recipient: Address,
        block: BlockNumber,
    ) -> Result<()> {
        cap.require(Scope::Group(self.group_id), Permission::Withdraw)?;
        self.debit(
            asset,
            amount,
            VaultEntryKind::Withdrawal {
                recipient,
                authorized_by: *cap.holder(),
            },
            block,
        )?;
        log::info!(
            "💸 Vault of group {} paid {} {} to {}",
            self.group_id,
            amount,
            asset,
            recipient
        );
        Ok(())
    }

    /// Debit for an executed proposal action
    pub fn transfer_for_action(
        &mut self,
        proposal_id: u64,
        action_index: usize,
        asset: Asset,
        amount: Amount,
        target: Address,
        block: BlockNumber,
    ) -> Result<()> {
        self.debit(
            asset,
            amount,
            VaultEntryKind::ActionTransfer {
                proposal_id,
                action_index,
                target,
            },
            block,
        )
    }

    /// Return an action transfer the host refused
    pub fn refund_action(
        &mut self,
        proposal_id: u64,
        action_index: usize,
        asset: Asset,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<()> {
        self.credit(
            asset,
            amount,
            VaultEntryKind::ActionRefund {
                proposal_id,
                action_index,
            },
            block,
        )
    }

    fn credit(
        &mut self,
        asset: Asset,
        amount: Amount,
        kind: VaultEntryKind,
        block: BlockNumber,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount("credit amount must be positive".to_string()));
        }
        let balance = self
            .balance(&asset)
            .checked_add(amount)
            .ok_or(VaultError::Overflow(asset))?;
        self.balances.insert(asset, balance);
        self.entries.push(VaultEntry {
            kind,
            asset,
            amount,
            block,
        });
        Ok(())
    }

    fn debit(
        &mut self,
        asset: Asset,
        amount: Amount,
        kind: VaultEntryKind,
        block: BlockNumber,
    ) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount("debit amount must be positive".to_string()));
        }
        let available = self.balance(&asset);
        if amount > available {
            return Err(VaultError::InsufficientBalance {
                asset,
                requested: amount,
                available,
            });
        }
        self.balances.insert(asset, available - amount);
        self.entries.push(VaultEntry {
            kind,
            asset,
            amount,
            block,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::PermissionTable;

    fn withdraw_cap(group_id: u64) -> Capability {
        let holder = Address::from_low_u64(1);
        let mut table = PermissionTable::new();
        table.grant(holder, Scope::Group(group_id), Permission::Withdraw);
        Capability::issue(&table, holder, Scope::Group(group_id), Permission::Withdraw).unwrap()
    }

    #[test]
    fn test_vault_addresses_are_unique_per_group() {
        assert_ne!(GroupVault::new(0).address(), GroupVault::new(1).address());
        assert_eq!(GroupVault::new(4).address(), GroupVault::new(4).address());
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut vault = GroupVault::new(0);
        let sender = Address::from_low_u64(9);
        vault.deposit(Asset::Native, 1_000, sender, 1).unwrap();
        assert_eq!(vault.balance(&Asset::Native), 1_000);

        let recipient = Address::from_low_u64(2);
        vault
            .withdraw(&withdraw_cap(0), Asset::Native, 400, recipient, 2)
            .unwrap();
        assert_eq!(vault.balance(&Asset::Native), 600);
        assert_eq!(vault.entries().len(), 2);
    }

    #[test]
    fn test_overdraw_leaves_balance_unchanged() {
        let mut vault = GroupVault::new(0);
        vault
            .deposit(Asset::Native, 100, Address::from_low_u64(9), 1)
            .unwrap();

        let err = vault
            .withdraw(&withdraw_cap(0), Asset::Native, 101, Address::from_low_u64(2), 2)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                asset: Asset::Native,
                requested: 101,
                available: 100
            }
        );
        assert_eq!(vault.balance(&Asset::Native), 100);
        assert_eq!(vault.entries().len(), 1);
    }

    #[test]
    fn test_withdraw_needs_capability_for_this_group() {
        let mut vault = GroupVault::new(1);
        vault
            .deposit(Asset::Native, 100, Address::from_low_u64(9), 1)
            .unwrap();

        let err = vault
            .withdraw(&withdraw_cap(0), Asset::Native, 10, Address::from_low_u64(2), 2)
            .unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
        assert_eq!(vault.balance(&Asset::Native), 100);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut vault = GroupVault::new(0);
        assert!(matches!(
            vault.deposit(Asset::Native, 0, Address::from_low_u64(9), 1),
            Err(VaultError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_action_transfer_and_refund() {
        let mut vault = GroupVault::new(0);
        let token = Asset::Token(Address::from_low_u64(50));
        vault.deposit(token, 10, Address::from_low_u64(9), 1).unwrap();

        vault
            .transfer_for_action(7, 0, token, 10, Address::from_low_u64(3), 2)
            .unwrap();
        assert_eq!(vault.balance(&token), 0);
        assert_eq!(vault.balances().count(), 0);

        vault.refund_action(7, 0, token, 10, 2).unwrap();
        assert_eq!(vault.balance(&token), 10);
    }
}

//! Membership Ledger
//!
//! Answers "who may vote in a group, with how much power, as of block B".
//! Two strategies share the [`MembershipLedger`] interface:
//! - token balance: power is the member's balance of a token at B
//! - address list: one unit per address listed at B, tracked with
//!   per-address checkpoints so past answers never change

use cohort_core::{Address, Amount, BlockNumber, CheckpointError, Checkpoints, TokenOracle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{GovernanceError, Result};

/// Point-in-time voting power queries
pub trait MembershipLedger {
    fn voting_power_of(&self, account: &Address, block: BlockNumber) -> Result<Amount>;

    fn total_voting_power(&self, block: BlockNumber) -> Result<Amount>;

    fn is_eligible(&self, account: &Address, block: BlockNumber) -> Result<bool> {
        Ok(self.voting_power_of(account, block)? > 0)
    }

    /// Whether `account` may open a proposal given the group's minimum
    fn can_propose(
        &self,
        account: &Address,
        block: BlockNumber,
        min_proposer_voting_power: Amount,
    ) -> Result<bool> {
        if min_proposer_voting_power == 0 {
            return Ok(true);
        }
        Ok(self.voting_power_of(account, block)? >= min_proposer_voting_power)
    }
}

/// Checkpointed address list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressList {
    listed: BTreeMap<Address, Checkpoints<bool>>,
    size: Checkpoints<u64>,
}

impl AddressList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listed_at(&self, account: &Address, block: BlockNumber) -> bool {
        self.listed
            .get(account)
            .map(|history| history.value_at(block))
            .unwrap_or(false)
    }

    pub fn is_listed(&self, account: &Address) -> bool {
        self.listed
            .get(account)
            .map(|history| history.latest())
            .unwrap_or(false)
    }

    pub fn size_at(&self, block: BlockNumber) -> u64 {
        self.size.value_at(block)
    }

    /// Currently listed addresses
    pub fn members(&self) -> Vec<Address> {
        self.listed
            .iter()
            .filter(|(_, history)| history.latest())
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// List `accounts` as of `block`.
    ///
    /// Fails without writing anything if any account is already listed or
    /// appears twice in the batch.
    pub fn add(&mut self, accounts: &[Address], block: BlockNumber) -> Result<()> {
        self.check_batch(accounts, false)?;
        self.apply(accounts, block, true)
    }

    /// Unlist `accounts` as of `block`.
    pub fn remove(&mut self, accounts: &[Address], block: BlockNumber) -> Result<()> {
        self.check_batch(accounts, true)?;
        self.apply(accounts, block, false)
    }

    fn check_batch(&self, accounts: &[Address], must_be_listed: bool) -> Result<()> {
        let mut seen = HashSet::new();
        for account in accounts {
            let listed = self.is_listed(account);
            // A repeat inside the batch would hit the state the first copy set.
            let repeated = !seen.insert(*account);
            if must_be_listed && (!listed || repeated) {
                return Err(GovernanceError::NotListed { account: *account });
            }
            if !must_be_listed && (listed || repeated) {
                return Err(GovernanceError::AlreadyListed { account: *account });
            }
        }
        Ok(())
    }

    fn apply(&mut self, accounts: &[Address], block: BlockNumber, listed: bool) -> Result<()> {
        if let Some(latest) = self.size.latest_block() {
            if block < latest {
                return Err(CheckpointError::StaleBlock {
                    latest,
                    requested: block,
                }
                .into());
            }
        }

        for account in accounts {
            self.listed
                .entry(*account)
                .or_default()
                .push(block, listed)?;
        }

        let count = accounts.len() as u64;
        let size = if listed {
            self.size.latest() + count
        } else {
            self.size.latest() - count
        };
        self.size.push(block, size)?;
        Ok(())
    }
}

impl MembershipLedger for AddressList {
    fn voting_power_of(&self, account: &Address, block: BlockNumber) -> Result<Amount> {
        Ok(if self.is_listed_at(account, block) { 1 } else { 0 })
    }

    fn total_voting_power(&self, block: BlockNumber) -> Result<Amount> {
        Ok(self.size_at(block) as Amount)
    }

    fn can_propose(
        &self,
        account: &Address,
        block: BlockNumber,
        min_proposer_voting_power: Amount,
    ) -> Result<bool> {
        // Any non-zero minimum means "must be listed".
        Ok(min_proposer_voting_power == 0 || self.is_listed_at(account, block))
    }
}

/// Token-balance strategy bound to a token oracle
pub struct TokenBalance<'a> {
    token: Address,
    oracle: &'a dyn TokenOracle,
}

impl<'a> TokenBalance<'a> {
    pub fn new(token: Address, oracle: &'a dyn TokenOracle) -> Self {
        Self { token, oracle }
    }
}

impl MembershipLedger for TokenBalance<'_> {
    fn voting_power_of(&self, account: &Address, block: BlockNumber) -> Result<Amount> {
        Ok(self.oracle.balance_of_at(&self.token, account, block)?)
    }

    fn total_voting_power(&self, block: BlockNumber) -> Result<Amount> {
        Ok(self.oracle.total_supply_at(&self.token, block)?)
    }
}

/// Membership rule requested at group creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipConfig {
    TokenBalance { token: Address },
    AddressList { members: Vec<Address> },
}

/// Membership rule bound to a group. The variant never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMembership {
    TokenBalance { token: Address },
    AddressList(AddressList),
}

impl GroupMembership {
    /// Build the membership for a new group
    pub fn from_config(
        config: MembershipConfig,
        oracle: &dyn TokenOracle,
        block: BlockNumber,
    ) -> Result<Self> {
        match config {
            MembershipConfig::TokenBalance { token } => {
                if !oracle.supports(&token) {
                    return Err(GovernanceError::UnsupportedToken(token));
                }
                Ok(GroupMembership::TokenBalance { token })
            }
            MembershipConfig::AddressList { members } => {
                let mut list = AddressList::new();
                if !members.is_empty() {
                    list.add(&members, block)?;
                }
                Ok(GroupMembership::AddressList(list))
            }
        }
    }

    /// View this membership through the common ledger interface
    pub fn ledger<'a>(&'a self, oracle: &'a dyn TokenOracle) -> Box<dyn MembershipLedger + 'a> {
        match self {
            GroupMembership::TokenBalance { token } => Box::new(TokenBalance::new(*token, oracle)),
            GroupMembership::AddressList(list) => Box::new(list),
        }
    }

    pub fn address_list(&self) -> Option<&AddressList> {
        match self {
            GroupMembership::AddressList(list) => Some(list),
            GroupMembership::TokenBalance { .. } => None,
        }
    }

    pub fn address_list_mut(&mut self) -> Option<&mut AddressList> {
        match self {
            GroupMembership::AddressList(list) => Some(list),
            GroupMembership::TokenBalance { .. } => None,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            GroupMembership::TokenBalance { .. } => "token-balance",
            GroupMembership::AddressList(_) => "address-list",
        }
    }
}

impl<L: MembershipLedger + ?Sized> MembershipLedger for &L {
    fn voting_power_of(&self, account: &Address, block: BlockNumber) -> Result<Amount> {
        (**self).voting_power_of(account, block)
    }

    fn total_voting_power(&self, block: BlockNumber) -> Result<Amount> {
        (**self).total_voting_power(block)
    }

    fn is_eligible(&self, account: &Address, block: BlockNumber) -> Result<bool> {
        (**self).is_eligible(account, block)
    }

    fn can_propose(&self, account: &Address, block: BlockNumber, min: Amount) -> Result<bool> {
        (**self).can_propose(account, block, min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::InMemoryTokens;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_add_and_remove_are_point_in_time() {
        let mut list = AddressList::new();
        list.add(&[addr(1), addr(2)], 10).unwrap();
        list.remove(&[addr(1)], 20).unwrap();
        list.add(&[addr(3)], 30).unwrap();

        assert!(!list.is_listed_at(&addr(1), 9));
        assert!(list.is_listed_at(&addr(1), 10));
        assert!(list.is_listed_at(&addr(1), 19));
        assert!(!list.is_listed_at(&addr(1), 20));

        assert_eq!(list.size_at(9), 0);
        assert_eq!(list.size_at(10), 2);
        assert_eq!(list.size_at(20), 1);
        assert_eq!(list.size_at(30), 2);
        assert_eq!(list.members(), vec![addr(2), addr(3)]);
    }

    #[test]
    fn test_add_already_listed_is_an_error() {
        let mut list = AddressList::new();
        list.add(&[addr(1)], 1).unwrap();

        let err = list.add(&[addr(2), addr(1)], 2).unwrap_err();
        assert_eq!(err, GovernanceError::AlreadyListed { account: addr(1) });
        // Nothing from the failed batch was written
        assert!(!list.is_listed(&addr(2)));
        assert_eq!(list.size_at(2), 1);
    }

    #[test]
    fn test_duplicate_in_batch_is_an_error() {
        let mut list = AddressList::new();
        let err = list.add(&[addr(4), addr(4)], 1).unwrap_err();
        assert_eq!(err, GovernanceError::AlreadyListed { account: addr(4) });
        assert_eq!(list.size_at(1), 0);

        list.add(&[addr(4)], 1).unwrap();
        let err = list.remove(&[addr(4), addr(4)], 2).unwrap_err();
        assert_eq!(err, GovernanceError::NotListed { account: addr(4) });
    }

    #[test]
    fn test_remove_unlisted_is_an_error() {
        let mut list = AddressList::new();
        assert_eq!(
            list.remove(&[addr(1)], 1),
            Err(GovernanceError::NotListed { account: addr(1) })
        );
    }

    #[test]
    fn test_address_list_power_and_proposer_rule() {
        let mut list = AddressList::new();
        list.add(&[addr(1)], 5).unwrap();

        assert_eq!(list.voting_power_of(&addr(1), 5).unwrap(), 1);
        assert_eq!(list.voting_power_of(&addr(2), 5).unwrap(), 0);
        assert_eq!(list.total_voting_power(5).unwrap(), 1);

        assert!(list.can_propose(&addr(2), 5, 0).unwrap());
        assert!(!list.can_propose(&addr(2), 5, 1).unwrap());
        assert!(list.can_propose(&addr(1), 5, 10).unwrap());
    }

    #[test]
    fn test_token_membership_reads_history() {
        let token = addr(100);
        let mut tokens = InMemoryTokens::new();
        tokens.register(token).unwrap();
        tokens.mint(&token, &addr(1), 60, 3).unwrap();
        tokens.mint(&token, &addr(2), 40, 4).unwrap();

        let membership =
            GroupMembership::from_config(MembershipConfig::TokenBalance { token }, &tokens, 4)
                .unwrap();
        let ledger = membership.ledger(&tokens);

        assert_eq!(ledger.total_voting_power(3).unwrap(), 60);
        assert_eq!(ledger.total_voting_power(4).unwrap(), 100);
        assert!(ledger.is_eligible(&addr(2), 4).unwrap());
        assert!(!ledger.is_eligible(&addr(2), 3).unwrap());
        assert!(ledger.can_propose(&addr(1), 4, 50).unwrap());
        assert!(!ledger.can_propose(&addr(2), 4, 50).unwrap());
    }

    #[test]
    fn test_unknown_token_rejected() {
        let tokens = InMemoryTokens::new();
        let err = GroupMembership::from_config(
            MembershipConfig::TokenBalance { token: addr(7) },
            &tokens,
            0,
        )
        .unwrap_err();
        assert_eq!(err, GovernanceError::UnsupportedToken(addr(7)));
    }
}

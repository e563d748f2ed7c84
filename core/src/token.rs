//! Token balance oracle
//!
//! Token-balance groups read historical balances and total supply from an
//! external fungible token. `InMemoryTokens` is a checkpointed token
//! registry that plays that role for the CLI and for tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::checkpoints::{CheckpointError, Checkpoints};
use crate::types::{Address, Amount, BlockNumber};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Address {0} has no recognizable balance interface")]
    UnknownToken(Address),

    #[error("Token already registered: {0}")]
    AlreadyRegistered(Address),

    #[error("Insufficient token balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Token supply overflow")]
    Overflow,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Historical balance queries against a token contract
pub trait TokenOracle {
    /// Whether `token` exposes a historical balance interface
    fn supports(&self, token: &Address) -> bool;

    fn balance_of_at(
        &self,
        token: &Address,
        account: &Address,
        block: BlockNumber,
    ) -> Result<Amount, TokenError>;

    fn total_supply_at(&self, token: &Address, block: BlockNumber) -> Result<Amount, TokenError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenLedger {
    balances: HashMap<Address, Checkpoints<Amount>>,
    supply: Checkpoints<Amount>,
}

impl TokenLedger {
    fn credit(&mut self, to: &Address, amount: Amount, block: BlockNumber) -> Result<(), TokenError> {
        let history = self.balances.entry(*to).or_default();
        let balance = history.latest().checked_add(amount).ok_or(TokenError::Overflow)?;
        history.push(block, balance)?;
        Ok(())
    }

    fn debit(&mut self, from: &Address, amount: Amount, block: BlockNumber) -> Result<(), TokenError> {
        let available = self.balances.get(from).map(|h| h.latest()).unwrap_or(0);
        if amount > available {
            return Err(TokenError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        self.balances
            .entry(*from)
            .or_default()
            .push(block, available - amount)?;
        Ok(())
    }
}

/// Checkpointed token registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTokens {
    tokens: HashMap<Address, TokenLedger>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: Address) -> Result<(), TokenError> {
        if self.tokens.contains_key(&token) {
            return Err(TokenError::AlreadyRegistered(token));
        }
        self.tokens.insert(token, TokenLedger::default());
        Ok(())
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.tokens.keys()
    }

    fn ledger_mut(&mut self, token: &Address) -> Result<&mut TokenLedger, TokenError> {
        self.tokens
            .get_mut(token)
            .ok_or(TokenError::UnknownToken(*token))
    }

    fn ledger(&self, token: &Address) -> Result<&TokenLedger, TokenError> {
        self.tokens.get(token).ok_or(TokenError::UnknownToken(*token))
    }

    pub fn mint(
        &mut self,
        token: &Address,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<(), TokenError> {
        // Stage on a copy so a failed supply update leaves no partial write.
        let mut ledger = self.ledger(token)?.clone();
        let supply = ledger.supply.latest().checked_add(amount).ok_or(TokenError::Overflow)?;
        ledger.credit(to, amount, block)?;
        ledger.supply.push(block, supply)?;
        *self.ledger_mut(token)? = ledger;
        log::debug!("Minted {} of {} to {} at block {}", amount, token, to, block);
        Ok(())
    }

    pub fn burn(
        &mut self,
        token: &Address,
        from: &Address,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<(), TokenError> {
        let mut ledger = self.ledger(token)?.clone();
        ledger.debit(from, amount, block)?;
        let supply = ledger.supply.latest().saturating_sub(amount);
        ledger.supply.push(block, supply)?;
        *self.ledger_mut(token)? = ledger;
        log::debug!("Burned {} of {} from {} at block {}", amount, token, from, block);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<(), TokenError> {
        let mut ledger = self.ledger(token)?.clone();
        ledger.debit(from, amount, block)?;
        ledger.credit(to, amount, block)?;
        *self.ledger_mut(token)? = ledger;
        Ok(())
    }
}

impl TokenOracle for InMemoryTokens {
    fn supports(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    fn balance_of_at(
        &self,
        token: &Address,
        account: &Address,
        block: BlockNumber,
    ) -> Result<Amount, TokenError> {
        let ledger = self.ledger(token)?;
        Ok(ledger
            .balances
            .get(account)
            .map(|h| h.value_at(block))
            .unwrap_or(0))
    }

    fn total_supply_at(&self, token: &Address, block: BlockNumber) -> Result<Amount, TokenError> {
        Ok(self.ledger(token)?.supply.value_at(block))
    }
}

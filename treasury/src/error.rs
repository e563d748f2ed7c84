//! Vault error types

use cohort_core::{Amount, Asset, PermissionError};
use thiserror::Error;

/// Group vault errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Insufficient vault balance of {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        requested: Amount,
        available: Amount,
    },

    #[error("Unauthorized vault access: {0}")]
    Unauthorized(#[from] PermissionError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Vault balance overflow for {0}")]
    Overflow(Asset),
}

pub type Result<T> = std::result::Result<T, VaultError>;

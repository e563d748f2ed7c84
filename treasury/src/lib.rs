//! Cohort Treasury Module
//!
//! Per-group custody accounts. Each group created by the registry gets
//! its own `GroupVault`, debited only through permissioned withdrawals
//! and executed proposal actions.

pub mod error;
pub mod vault;

pub use error::{Result, VaultError};
pub use vault::{GroupVault, VaultEntry, VaultEntryKind, VAULT_DOMAIN};

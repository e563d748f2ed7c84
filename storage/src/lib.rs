//! Cohort Storage Layer - sled-backed state persistence
//!
//! The engine state is stored as individually versioned records:
//! - `meta`: schema version and the committed block clock
//! - `groups`, `proposals`, `vaults`: one record per id
//! - `host`: opaque blobs owned by the embedding application
//!
//! A save stages every record in a [`Batch`] and commits it in one sled
//! transaction across all trees. Records written by an older release are
//! upgraded on load, and [`StateStore::migrate`] rewrites them at the
//! current version.

pub mod records;
pub mod store;

pub use records::{migrate_group_record, Envelope, GroupRecordV1, VotingSettingsV1, GROUP_RECORD_VERSION};
pub use store::{Batch, StateStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown {kind} record version {version}")]
    UnknownVersion { kind: &'static str, version: u16 },

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Inconsistent state: {0}")]
    Governance(#[from] governance::GovernanceError),
}

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

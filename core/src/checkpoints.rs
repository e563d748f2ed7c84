//! Block-indexed value history
//!
//! A `Checkpoints<T>` records the value of something at every block where
//! it changed. Entries are ordered by block and never rewritten once a
//! later block has been recorded, so a lookup at a past block returns the
//! same answer no matter what happens afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::BlockNumber;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("Checkpoint block {requested} is older than latest checkpoint {latest}")]
    StaleBlock {
        latest: BlockNumber,
        requested: BlockNumber,
    },
}

/// A single recorded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    pub block: BlockNumber,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoints<T> {
    entries: Vec<Checkpoint<T>>,
}

impl<T> Default for Checkpoints<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Copy + Default> Checkpoints<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as of `block`.
    ///
    /// A second write in the latest block replaces that block's value; a
    /// write older than the latest block is rejected.
    pub fn push(&mut self, block: BlockNumber, value: T) -> Result<(), CheckpointError> {
        match self.entries.last_mut() {
            Some(last) if block < last.block => Err(CheckpointError::StaleBlock {
                latest: last.block,
                requested: block,
            }),
            Some(last) if block == last.block => {
                last.value = value;
                Ok(())
            }
            _ => {
                self.entries.push(Checkpoint { block, value });
                Ok(())
            }
        }
    }

    /// Value as of `block`: the last checkpoint with `checkpoint.block <= block`,
    /// or `T::default()` if nothing was recorded yet.
    pub fn value_at(&self, block: BlockNumber) -> T {
        let idx = self.entries.partition_point(|c| c.block <= block);
        if idx == 0 {
            T::default()
        } else {
            self.entries[idx - 1].value
        }
    }

    /// Most recent value
    pub fn latest(&self) -> T {
        self.entries.last().map(|c| c.value).unwrap_or_default()
    }

    pub fn latest_block(&self) -> Option<BlockNumber> {
        self.entries.last().map(|c| c.block)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint<T>> {
        self.entries.iter()
    }
}

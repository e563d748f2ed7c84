//! Cohort Core Library
//!
//! Primitives shared by the vault, governance and storage crates.

pub mod checkpoints;
pub mod permissions;
pub mod ratio;
pub mod token;
pub mod types;

// Re-export main types
pub use checkpoints::{Checkpoint, CheckpointError, Checkpoints};
pub use permissions::{Authority, Capability, Permission, PermissionError, PermissionTable, Scope};
pub use ratio::{apply_ratio_ceiled, parse_ratio, RatioError, RATIO_BASE};
pub use token::{InMemoryTokens, TokenError, TokenOracle};
pub use types::{Address, AddressParseError, Amount, Asset, BlockContext, BlockNumber, Timestamp};

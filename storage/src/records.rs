//! Versioned record encoding

use cohort_core::{Address, Amount, BlockNumber};
use governance::{AbstainPolicy, Group, GroupMembership, VotingMode, VotingSettings};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Result, StorageError};

/// Current group record layout
pub const GROUP_RECORD_VERSION: u16 = 2;

/// Proposals and vaults have only ever had one layout
pub const PROPOSAL_RECORD_VERSION: u16 = 1;
pub const VAULT_RECORD_VERSION: u16 = 1;

/// Every stored value is wrapped with the layout version it was written in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u16,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn wrap<T: Serialize>(version: u16, value: &T) -> Result<Self> {
        Ok(Self {
            version,
            payload: bincode::serialize(value)?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn open<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Open a record that has a single layout
    pub fn open_exact<T: DeserializeOwned>(&self, kind: &'static str, version: u16) -> Result<T> {
        if self.version != version {
            return Err(StorageError::UnknownVersion {
                kind,
                version: self.version,
            });
        }
        self.open()
    }
}

/// Voting settings before abstain policies existed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSettingsV1 {
    pub voting_mode: VotingMode,
    pub support_threshold: u32,
    pub min_participation: u32,
    pub min_duration: u64,
    pub min_proposer_voting_power: Amount,
}

/// Group record, version 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecordV1 {
    pub id: u64,
    pub name: String,
    pub membership: GroupMembership,
    pub settings: VotingSettingsV1,
    pub vault_address: Address,
    pub created_at: BlockNumber,
}

/// Upgrade a version 1 group record. Abstentions were always final.
pub fn migrate_group_record(old: GroupRecordV1) -> Group {
    let s = old.settings;
    Group {
        id: old.id,
        name: old.name,
        membership: old.membership,
        settings: VotingSettings {
            voting_mode: s.voting_mode,
            support_threshold: s.support_threshold,
            min_participation: s.min_participation,
            min_duration: s.min_duration,
            min_proposer_voting_power: s.min_proposer_voting_power,
            abstain_policy: AbstainPolicy::Final,
        },
        vault_address: old.vault_address,
        created_at: old.created_at,
    }
}

/// Decode a group record of any known version
pub fn decode_group(envelope: &Envelope) -> Result<Group> {
    match envelope.version {
        1 => Ok(migrate_group_record(envelope.open()?)),
        GROUP_RECORD_VERSION => envelope.open(),
        version => Err(StorageError::UnknownVersion {
            kind: "group",
            version,
        }),
    }
}

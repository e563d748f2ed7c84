//! Sled-based persistence for governance state

use cohort_core::BlockContext;
use governance::{GovernanceState, GroupRegistry, Proposal, ProposalStore};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use std::path::Path;
use treasury::GroupVault;

use crate::records::{
    decode_group, Envelope, GROUP_RECORD_VERSION, PROPOSAL_RECORD_VERSION, VAULT_RECORD_VERSION,
};
use crate::{Result, StorageError};

const SCHEMA_VERSION: u16 = 2;
const KEY_SCHEMA: &[u8] = b"schema_version";
const KEY_CLOCK: &[u8] = b"clock";

#[derive(Debug, Clone)]
pub struct StateStore {
    db: sled::Db,
    meta: sled::Tree,
    groups: sled::Tree,
    proposals: sled::Tree,
    vaults: sled::Tree,
    host: sled::Tree,
}

impl StateStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            meta: db.open_tree("meta")?,
            groups: db.open_tree("groups")?,
            proposals: db.open_tree("proposals")?,
            vaults: db.open_tree("vaults")?,
            host: db.open_tree("host")?,
            db,
        })
    }

    /// Write the whole state and flush it to disk
    pub fn save(&self, state: &GovernanceState) -> Result<()> {
        self.commit(Batch::new().state(state)?)
    }

    /// Apply every staged record in one transaction across all trees, then flush.
    /// Either the whole batch is visible after a restart or none of it is.
    pub fn commit(&self, batch: Batch) -> Result<()> {
        let schema = SCHEMA_VERSION.to_be_bytes();
        let result: TransactionResult<()> = (
            &self.meta,
            &self.groups,
            &self.proposals,
            &self.vaults,
            &self.host,
        )
            .transaction(|(meta, groups, proposals, vaults, host)| {
                // Big-endian ids keep sled iteration in id order.
                for (id, bytes) in &batch.groups {
                    groups.insert(&id.to_be_bytes()[..], bytes.as_slice())?;
                }
                for (id, bytes) in &batch.vaults {
                    vaults.insert(&id.to_be_bytes()[..], bytes.as_slice())?;
                }
                for (id, bytes) in &batch.proposals {
                    proposals.insert(&id.to_be_bytes()[..], bytes.as_slice())?;
                }
                for (name, bytes) in &batch.blobs {
                    host.insert(name.as_bytes(), bytes.as_slice())?;
                }
                if let Some(clock) = &batch.clock {
                    meta.insert(KEY_CLOCK, clock.as_slice())?;
                    meta.insert(KEY_SCHEMA, &schema[..])?;
                }
                Ok(())
            });
        result.map_err(|e| match e {
            TransactionError::Storage(e) => StorageError::Database(e),
            TransactionError::Abort(()) => StorageError::Corrupt("save aborted".to_string()),
        })?;
        self.db.flush()?;

        log::debug!(
            "Saved {} group(s), {} proposal(s) and {} blob(s)",
            batch.groups.len(),
            batch.proposals.len(),
            batch.blobs.len()
        );
        Ok(())
    }

    /// Load the stored state, or `None` for a fresh database
    pub fn load(&self) -> Result<Option<GovernanceState>> {
        let schema = match self.meta.get(KEY_SCHEMA)? {
            Some(raw) => decode_schema(&raw)?,
            None => return Ok(None),
        };
        if schema > SCHEMA_VERSION {
            return Err(StorageError::UnknownVersion {
                kind: "schema",
                version: schema,
            });
        }

        let mut groups = Vec::new();
        for item in self.groups.iter() {
            let (_, raw) = item?;
            groups.push(decode_group(&Envelope::from_bytes(&raw)?)?);
        }

        let mut vaults = Vec::new();
        for item in self.vaults.iter() {
            let (_, raw) = item?;
            let vault: GroupVault =
                Envelope::from_bytes(&raw)?.open_exact("vault", VAULT_RECORD_VERSION)?;
            vaults.push(vault);
        }

        let mut proposals = Vec::new();
        for item in self.proposals.iter() {
            let (_, raw) = item?;
            let proposal: Proposal =
                Envelope::from_bytes(&raw)?.open_exact("proposal", PROPOSAL_RECORD_VERSION)?;
            proposals.push(proposal);
        }

        let clock: BlockContext = match self.meta.get(KEY_CLOCK)? {
            Some(raw) => Envelope::from_bytes(&raw)?.open_exact("clock", 1)?,
            None => BlockContext::default(),
        };

        log::info!(
            "📂 Loaded {} group(s) and {} proposal(s) at block {}",
            groups.len(),
            proposals.len(),
            clock.number
        );
        Ok(Some(GovernanceState {
            registry: GroupRegistry::from_records(groups, vaults)?,
            proposals: ProposalStore::from_records(proposals)?,
            clock,
        }))
    }

    /// Rewrite every record at the current layout. Returns how many were upgraded.
    pub fn migrate(&self) -> Result<usize> {
        let mut upgraded = 0;
        for item in self.groups.iter() {
            let (key, raw) = item?;
            let envelope = Envelope::from_bytes(&raw)?;
            if envelope.version == GROUP_RECORD_VERSION {
                continue;
            }
            let group = decode_group(&envelope)?;
            let current = Envelope::wrap(GROUP_RECORD_VERSION, &group)?;
            self.groups.insert(key, current.to_bytes()?)?;
            upgraded += 1;
        }

        if upgraded > 0 || self.meta.get(KEY_SCHEMA)?.is_some() {
            self.meta.insert(KEY_SCHEMA, &SCHEMA_VERSION.to_be_bytes()[..])?;
        }
        self.db.flush()?;

        if upgraded > 0 {
            log::info!("🔄 Migrated {} group record(s) to version {}", upgraded, GROUP_RECORD_VERSION);
        }
        Ok(upgraded)
    }

    pub fn load_blob<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.host.get(name.as_bytes())? {
            Some(raw) => Ok(Some(Envelope::from_bytes(&raw)?.open_exact("blob", 1)?)),
            None => Ok(None),
        }
    }

    /// Write a raw envelope under a group id (used when importing older data)
    pub fn put_group_envelope(&self, id: u64, envelope: &Envelope) -> Result<()> {
        self.groups.insert(id.to_be_bytes(), envelope.to_bytes()?)?;
        Ok(())
    }

    pub fn group_record_version(&self, id: u64) -> Result<Option<u16>> {
        match self.groups.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(Envelope::from_bytes(&raw)?.version)),
            None => Ok(None),
        }
    }
}

fn decode_schema(raw: &[u8]) -> Result<u16> {
    let bytes: [u8; 2] = raw
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("schema version has {} bytes", raw.len())))?;
    Ok(u16::from_be_bytes(bytes))
}

/// Encoded records staged for [`StateStore::commit`]
#[derive(Debug, Default)]
pub struct Batch {
    groups: Vec<(u64, Vec<u8>)>,
    vaults: Vec<(u64, Vec<u8>)>,
    proposals: Vec<(u64, Vec<u8>)>,
    clock: Option<Vec<u8>>,
    blobs: Vec<(String, Vec<u8>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage every group, vault and proposal plus the committed clock
    pub fn state(mut self, state: &GovernanceState) -> Result<Self> {
        for (group, vault) in state.registry.iter() {
            self.groups
                .push((group.id, Envelope::wrap(GROUP_RECORD_VERSION, group)?.to_bytes()?));
            self.vaults.push((
                vault.group_id(),
                Envelope::wrap(VAULT_RECORD_VERSION, vault)?.to_bytes()?,
            ));
        }
        for proposal in state.proposals.iter() {
            self.proposals.push((
                proposal.id,
                Envelope::wrap(PROPOSAL_RECORD_VERSION, proposal)?.to_bytes()?,
            ));
        }
        self.clock = Some(Envelope::wrap(1, &state.clock)?.to_bytes()?);
        Ok(self)
    }

    /// Stage an application blob (token registry, host balances)
    pub fn blob<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self> {
        self.blobs
            .push((name.to_string(), Envelope::wrap(1, value)?.to_bytes()?));
        Ok(self)
    }
}

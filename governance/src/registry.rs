//! Group Registry
//!
//! Groups are created once and never deleted. Ids are dense and start at
//! zero, so a group's id is also its index.

use cohort_core::{Address, BlockNumber};
use serde::{Deserialize, Serialize};
use treasury::GroupVault;

use crate::error::{GovernanceError, Result};
use crate::membership::GroupMembership;
use crate::settings::VotingSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub membership: GroupMembership,
    pub settings: VotingSettings,
    pub vault_address: Address,
    pub created_at: BlockNumber,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRegistry {
    groups: Vec<Group>,
    vaults: Vec<GroupVault>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.groups.len() as u64
    }

    /// Register a group and open its vault. Settings must already be valid.
    pub(crate) fn create(
        &mut self,
        name: String,
        membership: GroupMembership,
        settings: VotingSettings,
        block: BlockNumber,
    ) -> u64 {
        let id = self.next_id();
        let vault = GroupVault::new(id);
        self.groups.push(Group {
            id,
            name,
            membership,
            settings,
            vault_address: *vault.address(),
            created_at: block,
        });
        self.vaults.push(vault);
        id
    }

    pub fn group(&self, id: u64) -> Result<&Group> {
        self.groups
            .get(id as usize)
            .ok_or(GovernanceError::GroupNotFound(id))
    }

    pub(crate) fn group_mut(&mut self, id: u64) -> Result<&mut Group> {
        self.groups
            .get_mut(id as usize)
            .ok_or(GovernanceError::GroupNotFound(id))
    }

    pub fn vault(&self, id: u64) -> Result<&GroupVault> {
        self.vaults
            .get(id as usize)
            .ok_or(GovernanceError::GroupNotFound(id))
    }

    pub(crate) fn vault_mut(&mut self, id: u64) -> Result<&mut GroupVault> {
        self.vaults
            .get_mut(id as usize)
            .ok_or(GovernanceError::GroupNotFound(id))
    }

    pub fn count(&self) -> u64 {
        self.groups.len() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Group, &GroupVault)> {
        self.groups.iter().zip(self.vaults.iter())
    }

    /// Rebuild from persisted groups and vaults.
    ///
    /// Both lists must cover the same dense id range.
    pub fn from_records(mut groups: Vec<Group>, mut vaults: Vec<GroupVault>) -> Result<Self> {
        groups.sort_by_key(|g| g.id);
        vaults.sort_by_key(|v| v.group_id());
        for (index, group) in groups.iter().enumerate() {
            let id = index as u64;
            if group.id != id {
                return Err(GovernanceError::GroupNotFound(id));
            }
            match vaults.get(index) {
                Some(vault) if vault.group_id() == id && *vault.address() == group.vault_address => {}
                _ => return Err(GovernanceError::GroupNotFound(id)),
            }
        }
        if vaults.len() != groups.len() {
            return Err(GovernanceError::GroupNotFound(groups.len() as u64));
        }
        Ok(Self { groups, vaults })
    }
}

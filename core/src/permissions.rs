//! Capability tokens
//!
//! Privileged operations take a [`Capability`] argument instead of
//! consulting a global permission manager. A capability can only be
//! obtained through [`Capability::issue`], which asks the host's
//! [`Authority`] whether the holder has the permission on the scope.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::types::Address;

/// What a capability allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    CreateGroup,
    ManageMembership,
    UpdateVotingSettings,
    Withdraw,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::CreateGroup => "CREATE_GROUP",
            Permission::ManageMembership => "MANAGE_MEMBERSHIP",
            Permission::UpdateVotingSettings => "UPDATE_VOTING_SETTINGS",
            Permission::Withdraw => "WITHDRAW",
        };
        f.write_str(name)
    }
}

/// Where a permission applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// The whole organization
    Organization,
    /// A single group
    Group(u64),
}

impl Scope {
    /// An organization-wide grant covers every group
    pub fn covers(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Organization, _) => true,
            (Scope::Group(a), Scope::Group(b)) => a == b,
            (Scope::Group(_), Scope::Organization) => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization => write!(f, "organization"),
            Scope::Group(id) => write!(f, "group {}", id),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("{holder} lacks {permission} on {scope}")]
    Denied {
        holder: Address,
        scope: Scope,
        permission: Permission,
    },
}

/// The host permission system.
pub trait Authority {
    fn is_granted(&self, who: &Address, scope: &Scope, permission: Permission) -> bool;
}

/// Proof that `holder` was granted `permission` on `scope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    holder: Address,
    scope: Scope,
    permission: Permission,
}

impl Capability {
    /// Ask `authority` for a capability
    pub fn issue(
        authority: &dyn Authority,
        holder: Address,
        scope: Scope,
        permission: Permission,
    ) -> Result<Self, PermissionError> {
        if !authority.is_granted(&holder, &scope, permission) {
            log::warn!("Capability denied: {} lacks {} on {}", holder, permission, scope);
            return Err(PermissionError::Denied {
                holder,
                scope,
                permission,
            });
        }
        Ok(Self {
            holder,
            scope,
            permission,
        })
    }

    pub fn holder(&self) -> &Address {
        &self.holder
    }

    /// Check this capability covers `permission` on `scope`
    pub fn require(&self, scope: Scope, permission: Permission) -> Result<(), PermissionError> {
        if self.permission == permission && self.scope.covers(&scope) {
            Ok(())
        } else {
            Err(PermissionError::Denied {
                holder: self.holder,
                scope,
                permission,
            })
        }
    }
}

/// Grant table used by the CLI and tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionTable {
    admins: HashSet<Address>,
    grants: HashSet<(Address, Scope, Permission)>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admins hold every permission on every scope
    pub fn with_admins(admins: impl IntoIterator<Item = Address>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            grants: HashSet::new(),
        }
    }

    pub fn grant(&mut self, who: Address, scope: Scope, permission: Permission) {
        self.grants.insert((who, scope, permission));
    }

    pub fn revoke(&mut self, who: &Address, scope: Scope, permission: Permission) {
        self.grants.remove(&(*who, scope, permission));
    }
}

impl Authority for PermissionTable {
    fn is_granted(&self, who: &Address, scope: &Scope, permission: Permission) -> bool {
        if self.admins.contains(who) {
            return true;
        }
        self.grants
            .iter()
            .any(|(holder, granted, p)| holder == who && *p == permission && granted.covers(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_requires_grant() {
        let alice = Address::from_low_u64(1);
        let mut table = PermissionTable::new();

        let denied = Capability::issue(&table, alice, Scope::Group(0), Permission::Withdraw);
        assert!(matches!(denied, Err(PermissionError::Denied { .. })));

        table.grant(alice, Scope::Group(0), Permission::Withdraw);
        let cap = Capability::issue(&table, alice, Scope::Group(0), Permission::Withdraw).unwrap();
        assert_eq!(cap.holder(), &alice);
        assert!(cap.require(Scope::Group(0), Permission::Withdraw).is_ok());
        assert!(cap.require(Scope::Group(1), Permission::Withdraw).is_err());
        assert!(cap.require(Scope::Group(0), Permission::ManageMembership).is_err());
    }

    #[test]
    fn test_organization_scope_covers_groups() {
        let admin = Address::from_low_u64(2);
        let mut table = PermissionTable::new();
        table.grant(admin, Scope::Organization, Permission::ManageMembership);

        let cap = Capability::issue(
            &table,
            admin,
            Scope::Group(3),
            Permission::ManageMembership,
        )
        .unwrap();
        assert!(cap.require(Scope::Group(3), Permission::ManageMembership).is_ok());

        table.revoke(&admin, Scope::Organization, Permission::ManageMembership);
        assert!(!table.is_granted(&admin, &Scope::Group(3), Permission::ManageMembership));
    }

    #[test]
    fn test_admins_hold_everything() {
        let admin = Address::from_low_u64(3);
        let table = PermissionTable::with_admins([admin]);
        assert!(table.is_granted(&admin, &Scope::Organization, Permission::CreateGroup));
        assert!(table.is_granted(&admin, &Scope::Group(9), Permission::Withdraw));
    }
}

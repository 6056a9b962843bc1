//! Permission entities as held in the permission catalog.

use crate::entity::{Entity, EntityId, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A permission is an atomic named action defined under a guard.
///
/// Catalog copies carry the ids of every role that grants the permission, so
/// role-mediated checks never need a store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: EntityId,
    name: String,
    guard: String,
    /// Roles granting this permission.
    roles: BTreeSet<EntityId>,
}

impl Permission {
    /// Build a permission from its stored row and granting roles.
    pub fn from_record(record: EntityRecord, roles: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            guard: record.guard,
            roles: roles.into_iter().collect(),
        }
    }

    /// Ids of the roles that grant this permission.
    pub fn roles(&self) -> &BTreeSet<EntityId> {
        &self.roles
    }

    /// Check whether the given role grants this permission.
    pub fn is_granted_by(&self, role_id: EntityId) -> bool {
        self.roles.contains(&role_id)
    }
}

impl Entity for Permission {
    const KIND: EntityKind = EntityKind::Permission;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn guard(&self) -> &str {
        &self.guard
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.guard)
    }
}

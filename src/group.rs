//! Group entities as held in the group catalog.

use crate::entity::{Entity, EntityId, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A group is a named bundle of roles and direct permissions.
///
/// Groups are exactly one level deep: a group never belongs to another group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: EntityId,
    name: String,
    guard: String,
    roles: BTreeSet<EntityId>,
    permissions: BTreeSet<EntityId>,
}

impl Group {
    /// Build a group from its stored row and loaded associations.
    pub fn from_record(
        record: EntityRecord,
        roles: impl IntoIterator<Item = EntityId>,
        permissions: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        Self {
            id: record.id,
            name: record.name,
            guard: record.guard,
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Role ids assigned to this group.
    pub fn roles(&self) -> &BTreeSet<EntityId> {
        &self.roles
    }

    /// Direct permission ids given to this group.
    pub fn permissions(&self) -> &BTreeSet<EntityId> {
        &self.permissions
    }

    /// Check whether the role is assigned to this group.
    pub fn has_role_id(&self, role_id: EntityId) -> bool {
        self.roles.contains(&role_id)
    }
}

impl Entity for Group {
    const KIND: EntityKind = EntityKind::Group;

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

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.guard)
    }
}

//! Role entities.

use crate::entity::{Entity, EntityId, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A role is a named bundle of permissions, assignable to subjects and groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: EntityId,
    name: String,
    guard: String,
    /// Permissions given to this role, as loaded.
    permissions: BTreeSet<EntityId>,
    /// Groups this role belongs to, as loaded.
    groups: BTreeSet<EntityId>,
}

impl Role {
    /// Build a role from its stored row with no associations loaded.
    pub fn from_record(record: EntityRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            guard: record.guard,
            permissions: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Attach loaded associations.
    pub fn with_associations(
        mut self,
        permissions: impl IntoIterator<Item = EntityId>,
        groups: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.permissions = permissions.into_iter().collect();
        self.groups = groups.into_iter().collect();
        self
    }

    /// Permission ids given to this role when it was loaded.
    pub fn permissions(&self) -> &BTreeSet<EntityId> {
        &self.permissions
    }

    /// Group ids this role belonged to when it was loaded.
    pub fn groups(&self) -> &BTreeSet<EntityId> {
        &self.groups
    }

    /// Check whether this role belonged to the given group when loaded.
    pub fn belongs_to_group(&self, group_id: EntityId) -> bool {
        self.groups.contains(&group_id)
    }
}

impl Entity for Role {
    const KIND: EntityKind = EntityKind::Role;

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

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.guard)
    }
}

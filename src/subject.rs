//! Subjects: the authorizable models (users, services, ...) whose grants are resolved.

use crate::{
    entity::{Entity, EntityId, SubjectKey},
    group::Group,
    role::Role,
};
use std::collections::BTreeSet;

/// Associations queued on a subject that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAssociations {
    /// Role ids to attach once the subject exists.
    pub roles: BTreeSet<EntityId>,
    /// Group ids to attach once the subject exists.
    pub groups: BTreeSet<EntityId>,
}

impl PendingAssociations {
    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.groups.is_empty()
    }
}

/// A subject and its loaded role, group and direct-permission associations.
///
/// The registrar reloads the association it touches after every mutation, so a
/// subject handed back from an assignment reflects the post-mutation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Model type used for guard resolution, e.g. "user".
    model_type: String,
    /// Store key; `None` until persisted.
    key: Option<String>,
    /// Explicit guard override.
    guard: Option<String>,
    roles: Vec<Role>,
    groups: Vec<Group>,
    permissions: BTreeSet<EntityId>,
    pending: PendingAssociations,
}

impl Subject {
    /// Create a subject that has not been persisted yet.
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            key: None,
            guard: None,
            roles: Vec::new(),
            groups: Vec::new(),
            permissions: BTreeSet::new(),
            pending: PendingAssociations::default(),
        }
    }

    /// Create a handle for an already persisted subject. Associations are empty
    /// until loaded through the registrar.
    pub fn persisted(model_type: impl Into<String>, key: impl Into<String>) -> Self {
        let mut subject = Self::new(model_type);
        subject.key = Some(key.into());
        subject
    }

    /// Pin the subject to a specific guard instead of deriving it from its type.
    pub fn with_guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Get the subject's model type.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Get the store key, if persisted.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Get the explicit guard override, if any.
    pub fn guard(&self) -> Option<&str> {
        self.guard.as_deref()
    }

    /// Check whether the subject exists in the store.
    pub fn is_persisted(&self) -> bool {
        self.key.is_some()
    }

    /// Get the association key of a persisted subject.
    pub fn subject_key(&self) -> Option<SubjectKey> {
        self.key
            .as_ref()
            .map(|key| SubjectKey::new(self.model_type.clone(), key.clone()))
    }

    /// Loaded roles.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Loaded groups.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Loaded direct permission ids.
    pub fn permission_ids(&self) -> &BTreeSet<EntityId> {
        &self.permissions
    }

    /// Ids of the loaded roles.
    pub fn role_ids(&self) -> BTreeSet<EntityId> {
        self.roles.iter().map(Entity::id).collect()
    }

    /// Ids of the loaded groups.
    pub fn group_ids(&self) -> BTreeSet<EntityId> {
        self.groups.iter().map(Entity::id).collect()
    }

    /// Associations waiting for the subject to be persisted.
    pub fn pending(&self) -> &PendingAssociations {
        &self.pending
    }

    pub(crate) fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    pub(crate) fn set_roles(&mut self, roles: Vec<Role>) {
        self.roles = roles;
    }

    pub(crate) fn set_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups;
    }

    pub(crate) fn set_permissions(&mut self, permissions: BTreeSet<EntityId>) {
        self.permissions = permissions;
    }

    pub(crate) fn pending_mut(&mut self) -> &mut PendingAssociations {
        &mut self.pending
    }

    /// Merge roles into the loaded set without touching the store.
    pub(crate) fn merge_roles(&mut self, roles: Vec<Role>) {
        for role in roles {
            if !self.roles.iter().any(|r| r.id() == role.id()) {
                self.roles.push(role);
            }
        }
    }

    /// Merge groups into the loaded set without touching the store.
    pub(crate) fn merge_groups(&mut self, groups: Vec<Group>) {
        for group in groups {
            if !self.groups.iter().any(|g| g.id() == group.id()) {
                self.groups.push(group);
            }
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}:{}", self.model_type, key),
            None => write!(f, "{}:<unsaved>", self.model_type),
        }
    }
}

//! Shared entity vocabulary: kinds, identities, association owners and relations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a stored permission, role or group.
pub type EntityId = u64;

/// The kinds of entity the registrar manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// An atomic named action.
    Permission,
    /// A named bundle of permissions.
    Role,
    /// A named bundle of roles and permissions.
    Group,
}

impl EntityKind {
    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Permission => "permission",
            EntityKind::Role => "role",
            EntityKind::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bare stored row of a permission, role or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Store-assigned identity.
    pub id: EntityId,
    /// Name, unique together with `guard`.
    pub name: String,
    /// Guard the entity is defined under.
    pub guard: String,
}

/// Common surface of permissions, roles and groups.
pub trait Entity: Clone {
    /// Kind of this entity.
    const KIND: EntityKind;

    /// Store-assigned identity.
    fn id(&self) -> EntityId;

    /// Entity name.
    fn name(&self) -> &str;

    /// Guard the entity is defined under.
    fn guard(&self) -> &str;
}

/// Identity of a persisted subject: its model type and store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    /// Model type, e.g. "user".
    pub model_type: String,
    /// Store key of the subject row.
    pub key: String,
}

impl SubjectKey {
    /// Create a subject key.
    pub fn new(model_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_type, self.key)
    }
}

/// The owning side of an association row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    /// A persisted subject.
    Subject(SubjectKey),
    /// A role.
    Role(EntityId),
    /// A group.
    Group(EntityId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Subject(key) => write!(f, "subject {key}"),
            Owner::Role(id) => write!(f, "role #{id}"),
            Owner::Group(id) => write!(f, "group #{id}"),
        }
    }
}

/// The association tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    /// Subject has roles.
    SubjectRoles,
    /// Subject has groups.
    SubjectGroups,
    /// Subject has direct permissions.
    SubjectPermissions,
    /// Role has permissions.
    RolePermissions,
    /// Group has roles.
    GroupRoles,
    /// Group has direct permissions.
    GroupPermissions,
}

impl Relation {
    /// All relations, in table order.
    pub const ALL: [Relation; 6] = [
        Relation::SubjectRoles,
        Relation::SubjectGroups,
        Relation::SubjectPermissions,
        Relation::RolePermissions,
        Relation::GroupRoles,
        Relation::GroupPermissions,
    ];

    /// Kind of entity on the target side of the relation.
    pub fn target_kind(&self) -> EntityKind {
        match self {
            Relation::SubjectRoles | Relation::GroupRoles => EntityKind::Role,
            Relation::SubjectGroups => EntityKind::Group,
            Relation::SubjectPermissions
            | Relation::RolePermissions
            | Relation::GroupPermissions => EntityKind::Permission,
        }
    }

    /// Whether `owner` may own rows of this relation.
    pub fn accepts(&self, owner: &Owner) -> bool {
        matches!(
            (self, owner),
            (
                Relation::SubjectRoles | Relation::SubjectGroups | Relation::SubjectPermissions,
                Owner::Subject(_)
            ) | (Relation::RolePermissions, Owner::Role(_))
                | (
                    Relation::GroupRoles | Relation::GroupPermissions,
                    Owner::Group(_)
                )
        )
    }
}

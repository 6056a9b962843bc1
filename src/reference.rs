//! References to permissions, roles and groups.
//!
//! Every registrar API that takes "a role" (or permission, or group) accepts a
//! [`Reference`]: a name, an id, a loaded entity, or a list mixing all three.

use crate::{
    entity::{Entity, EntityId},
    error::{Error, Result},
    group::Group,
    permission::Permission,
    role::Role,
};

/// A reference to one or more entities of type `E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<E> {
    /// Look up by name under the acting guard.
    Name(String),
    /// Look up by id under the acting guard.
    Id(EntityId),
    /// An already loaded entity.
    Entity(E),
    /// Any number of references.
    Many(Vec<Reference<E>>),
}

impl<E> Reference<E> {
    /// Parse a pipe-delimited list of names, e.g. `"writer|admin"`.
    pub fn names(piped: &str) -> Self {
        let mut names: Vec<Reference<E>> = piped
            .split('|')
            .map(|name| Reference::Name(name.trim().to_string()))
            .collect();
        if names.len() == 1 {
            names.remove(0)
        } else {
            Reference::Many(names)
        }
    }

    /// Flatten nested lists into single references, preserving order.
    pub fn flatten(self) -> Vec<Reference<E>> {
        let mut flat = Vec::new();
        self.flatten_into(&mut flat);
        flat
    }

    fn flatten_into(self, flat: &mut Vec<Reference<E>>) {
        match self {
            Reference::Many(references) => {
                for reference in references {
                    reference.flatten_into(flat);
                }
            }
            single => flat.push(single),
        }
    }

    /// Reject empty names and the zero id anywhere in the reference.
    pub fn validate(&self) -> Result<()> {
        match self {
            Reference::Name(name) if name.trim().is_empty() => Err(Error::InvalidReference(
                "name cannot be empty".to_string(),
            )),
            Reference::Id(0) => Err(Error::InvalidReference("id cannot be 0".to_string())),
            Reference::Many(references) => references.iter().try_for_each(Reference::validate),
            _ => Ok(()),
        }
    }

    /// Returns true if the reference holds nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Reference::Many(references) => references.iter().all(Reference::is_empty),
            _ => false,
        }
    }
}

impl<E: Entity> Reference<E> {
    /// Check whether `entity` is referenced. Names containing `|` match any
    /// of their parts; lists match if any element matches.
    pub fn matches(&self, entity: &E) -> bool {
        match self {
            Reference::Name(name) if name.contains('|') => name
                .split('|')
                .any(|part| part.trim() == entity.name()),
            Reference::Name(name) => name == entity.name(),
            Reference::Id(id) => *id == entity.id(),
            Reference::Entity(other) => other.id() == entity.id(),
            Reference::Many(references) => references.iter().any(|r| r.matches(entity)),
        }
    }
}

impl<E> From<&str> for Reference<E> {
    fn from(name: &str) -> Self {
        Reference::Name(name.to_string())
    }
}

impl<E> From<String> for Reference<E> {
    fn from(name: String) -> Self {
        Reference::Name(name)
    }
}

impl<E> From<&String> for Reference<E> {
    fn from(name: &String) -> Self {
        Reference::Name(name.clone())
    }
}

impl<E> From<EntityId> for Reference<E> {
    fn from(id: EntityId) -> Self {
        Reference::Id(id)
    }
}

impl<E, R> From<Vec<R>> for Reference<E>
where
    R: Into<Reference<E>>,
{
    fn from(references: Vec<R>) -> Self {
        Reference::Many(references.into_iter().map(Into::into).collect())
    }
}

macro_rules! entity_references {
    ($($entity:ty),*) => {
        $(
            impl From<$entity> for Reference<$entity> {
                fn from(entity: $entity) -> Self {
                    Reference::Entity(entity)
                }
            }

            impl From<&$entity> for Reference<$entity> {
                fn from(entity: &$entity) -> Self {
                    Reference::Entity(entity.clone())
                }
            }
        )*
    };
}

entity_references!(Permission, Role, Group);

/// Reference to a permission.
pub type PermissionRef = Reference<Permission>;
/// Reference to a role.
pub type RoleRef = Reference<Role>;
/// Reference to a group.
pub type GroupRef = Reference<Group>;

//! Error types for the registrar.

use crate::entity::EntityKind;
use thiserror::Error;

/// The main error type for registrar operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A name or id did not resolve to a stored entity.
    #[error("There is no {kind} {reference}")]
    EntityDoesNotExist {
        /// Kind of entity that was looked up.
        kind: EntityKind,
        /// Human-readable form of the reference, e.g. "named `edit`".
        reference: String,
    },

    /// An entity with the same `(name, guard)` already exists.
    #[error("A {kind} `{name}` already exists for guard `{guard}`")]
    DuplicateEntity {
        /// Kind of entity being created.
        kind: EntityKind,
        /// Requested name.
        name: String,
        /// Requested guard.
        guard: String,
    },

    /// The entity belongs to a guard the acting subject is not served by.
    #[error("The given {kind} is for guard `{entity_guard}`, expected one of {subject_guards:?}")]
    GuardMismatch {
        /// Kind of the offending entity.
        kind: EntityKind,
        /// Guard the entity was created under.
        entity_guard: String,
        /// Guards the subject can act under.
        subject_guards: Vec<String>,
    },

    /// A reference was empty or otherwise unusable.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The operation needs a persisted subject.
    #[error("Subject of type `{0}` has not been persisted")]
    SubjectNotPersisted(String),

    /// Entity store operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Shared cache backend operation failed.
    #[error("Cache backend failed: {0}")]
    Cache(String),

    /// Catalog payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl Error {
    pub(crate) fn not_named(kind: EntityKind, name: &str) -> Self {
        Error::EntityDoesNotExist {
            kind,
            reference: format!("named `{name}`"),
        }
    }

    pub(crate) fn not_with_id(kind: EntityKind, id: u64) -> Self {
        Error::EntityDoesNotExist {
            kind,
            reference: format!("with id `{id}`"),
        }
    }

    /// Returns true for name/id resolution failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::EntityDoesNotExist { .. })
    }

    /// Returns true for guard mismatches.
    pub fn is_guard_mismatch(&self) -> bool {
        matches!(self, Error::GuardMismatch { .. })
    }
}

/// Result type alias for registrar operations.
pub type Result<T> = std::result::Result<T, Error>;

//! # Role Groups
//!
//! Guard-partitioned authorization resolution: subjects hold permissions
//! directly, through roles, and through groups that aggregate roles and
//! permissions.
//!
//! ## Features
//!
//! - Permissions, roles and groups partitioned by guard (authentication context)
//! - Three grant paths: direct, role, and group (group roles and group permissions)
//! - Whole-catalog read-through cache shared across processes, flushed on every mutation
//! - Pluggable entity store and cache backends
//! - Deferred role and group assignment for subjects not yet persisted
//! - Three-valued pre-check for a host authorization gate
//! - Audit logging of mutations
//!
//! ## Quick Start
//!
//! ```rust
//! use role_groups::{Registrar, Subject};
//!
//! let registrar = Registrar::new();
//!
//! let edit = registrar.create_permission("edit-articles", None)?;
//! let writer = registrar.create_role("writer", None)?;
//! registrar.give_permission_to(&writer, &edit)?;
//!
//! let staff = registrar.create_group("staff", None)?;
//! registrar.assign_role_to_group(&staff, &writer)?;
//!
//! // Roles and groups assigned before the subject exists are queued.
//! let mut user = Subject::new("user");
//! registrar.assign_group(&mut user, "staff")?;
//! registrar.persist_subject(&mut user)?;
//!
//! assert!(registrar.has_permission_to(&user, "edit-articles")?);
//! assert!(!registrar.has_role(&user, "writer"));
//! assert!(registrar.has_role_through_groups(&user, "writer")?);
//! # Ok::<(), role_groups::Error>(())
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled, creations, assignments and removals are
//! logged at info level through the `log` facade:
//!
//! ```rust,ignore
//! use role_groups::init_audit_logger;
//!
//! // RUST_LOG=info,role_groups=debug
//! init_audit_logger();
//! ```
//!
//! Catalog loads and permission checks are logged at debug level, guard
//! mismatches and cache store fallbacks at warn level, regardless of features.

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    env_logger::init();
}

pub mod assignment;
pub mod cache;
pub mod config;
pub mod core;
pub mod entity;
pub mod error;
pub mod gate;
pub mod group;
pub mod guard;
pub mod macros;
pub mod metrics;
pub mod permission;
pub mod reference;
pub mod resolution;
pub mod role;
pub mod storage;
pub mod subject;

#[cfg(test)]
mod property_tests;

// Re-export main types for convenience
pub use crate::{
    assignment::Grantee,
    cache::{
        CacheBackend, CacheStores, CatalogCache, CatalogFilter, FileCacheBackend, MemoryCacheBackend,
    },
    config::{
        CacheConfig, CacheExpiration, GateConfig, GuardConfig, GuardMapping, RegistrarConfig,
        TableNames,
    },
    core::Registrar,
    entity::{Entity, EntityId, EntityKind, EntityRecord, Owner, Relation, SubjectKey},
    error::{Error, Result},
    gate::{Gate, GateDecision},
    group::Group,
    guard::GuardResolver,
    metrics::{MetricsSummary, RegistrarMetrics},
    permission::Permission,
    reference::{GroupRef, PermissionRef, Reference, RoleRef},
    resolution::{PermissionHolder, holder_grants},
    role::Role,
    storage::{EntityStore, MemoryStore},
    subject::{PendingAssociations, Subject},
};

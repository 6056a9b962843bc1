//! Registrar configuration.
//!
//! Hosts usually deserialize [`RegistrarConfig`] from their own configuration
//! files; every section has a `Default` matching a single `web` guard serving
//! `user` models, an in-process cache store and non-expiring catalog entries.

use crate::{
    entity::Relation,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the registrar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Guard to model mapping.
    pub guards: GuardConfig,
    /// Table names for entities and associations.
    pub tables: TableNames,
    /// Catalog cache settings.
    pub cache: CacheConfig,
    /// Gate hook behaviour.
    pub gate: GateConfig,
}

impl RegistrarConfig {
    /// Replace the guard section.
    pub fn with_guards(mut self, guards: GuardConfig) -> Self {
        self.guards = guards;
        self
    }

    /// Replace the cache section.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the table names.
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    /// Make the gate answer `Denied` instead of deferring on negative checks.
    pub fn authoritative_gate(mut self) -> Self {
        self.gate.authoritative = true;
        self
    }

    /// Check the configuration for values the registrar cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.guards.default_guard.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "default guard cannot be empty".to_string(),
            ));
        }
        if self.cache.permission_key.is_empty() || self.cache.group_key.is_empty() {
            return Err(Error::InvalidConfiguration(
                "cache keys cannot be empty".to_string(),
            ));
        }
        if self.cache.permission_key == self.cache.group_key {
            return Err(Error::InvalidConfiguration(format!(
                "permission and group catalogs share the cache key `{}`",
                self.cache.group_key
            )));
        }
        Ok(())
    }
}

/// A single guard and the subject model type it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardMapping {
    /// Guard name, e.g. "web".
    pub guard: String,
    /// Subject model type served by the guard, e.g. "user".
    pub model: String,
}

/// Guard to model mapping, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Guard used when no mapping matches a subject type.
    pub default_guard: String,
    /// Declared guards; several guards may serve the same model.
    pub mappings: Vec<GuardMapping>,
}

impl GuardConfig {
    /// Create a guard configuration with the given default and no mappings.
    pub fn new(default_guard: impl Into<String>) -> Self {
        Self {
            default_guard: default_guard.into(),
            mappings: Vec::new(),
        }
    }

    /// Declare a guard serving the given model type.
    pub fn guard(mut self, guard: impl Into<String>, model: impl Into<String>) -> Self {
        self.mappings.push(GuardMapping {
            guard: guard.into(),
            model: model.into(),
        });
        self
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new("web").guard("web", "user")
    }
}

/// Table names for entities and associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub permissions: String,
    pub roles: String,
    pub groups: String,
    pub subject_has_roles: String,
    pub subject_has_groups: String,
    pub subject_has_permissions: String,
    pub role_has_permissions: String,
    pub group_has_roles: String,
    pub group_has_permissions: String,
}

impl TableNames {
    /// Table backing the given association.
    pub fn relation(&self, relation: Relation) -> &str {
        match relation {
            Relation::SubjectRoles => &self.subject_has_roles,
            Relation::SubjectGroups => &self.subject_has_groups,
            Relation::SubjectPermissions => &self.subject_has_permissions,
            Relation::RolePermissions => &self.role_has_permissions,
            Relation::GroupRoles => &self.group_has_roles,
            Relation::GroupPermissions => &self.group_has_permissions,
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            permissions: "permissions".to_string(),
            roles: "roles".to_string(),
            groups: "groups".to_string(),
            subject_has_roles: "model_has_roles".to_string(),
            subject_has_groups: "model_has_groups".to_string(),
            subject_has_permissions: "model_has_permissions".to_string(),
            role_has_permissions: "role_has_permissions".to_string(),
            group_has_roles: "group_has_roles".to_string(),
            group_has_permissions: "group_has_permissions".to_string(),
        }
    }
}

/// How long shared catalog entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheExpiration {
    /// Entries never expire on their own.
    Forever,
    /// Entries expire after the duration.
    After(Duration),
}

impl CacheExpiration {
    /// Get the TTL, `None` meaning indefinite.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheExpiration::Forever => None,
            CacheExpiration::After(duration) => Some(*duration),
        }
    }
}

/// Catalog cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Named cache store, or "default" for the registry default.
    pub store: String,
    /// Shared cache key of the permission catalog.
    pub permission_key: String,
    /// Shared cache key of the group catalog.
    pub group_key: String,
    /// Shared entry expiration.
    pub expiration: CacheExpiration,
}

impl CacheConfig {
    /// Select a named cache store.
    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    /// Set the shared entry expiration.
    pub fn expiration(mut self, expiration: CacheExpiration) -> Self {
        self.expiration = expiration;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: "default".to_string(),
            permission_key: "role_groups.permissions".to_string(),
            group_key: "role_groups.groups".to_string(),
            expiration: CacheExpiration::After(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

/// Gate hook behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// When set, a negative check answers `Denied` instead of deferring.
    pub authoritative: bool,
}

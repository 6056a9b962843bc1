//! Catalog cache: the full permission and group catalogs, held in-process and
//! in a shared backend.
//!
//! Resolution walks role → permission and group → role → permission edges, so
//! both catalogs are loaded whole and invalidated whole. Any mutation clears
//! the in-process holders and forgets both shared entries.
//!
//! # Consistency
//!
//! Within one process, once [`CatalogCache::invalidate`] returns every later
//! read reloads. Across processes there is no invalidation broadcast: a
//! process that already holds a snapshot keeps using it, and a process that
//! reloads from a shared entry written before a mutation elsewhere sees that
//! entry until it expires. This eventual-consistency window is bounded by the
//! configured [`CacheExpiration`](crate::config::CacheExpiration).

use crate::{
    config::CacheConfig,
    entity::{Entity, EntityId, EntityKind, Owner, Relation},
    error::{Error, Result},
    group::Group,
    metrics::RegistrarMetrics,
    permission::Permission,
    storage::EntityStore,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Loader invoked by a backend on a miss; returns the serialized value.
pub type Loader<'a> = &'a mut dyn FnMut() -> Result<String>;

/// A shared key/value cache, possibly visible to other processes.
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Return the live value under `key`, or run `loader`, store its value
    /// for `ttl` (`None` = indefinitely) and return it.
    fn remember(&self, key: &str, ttl: Option<Duration>, loader: Loader<'_>) -> Result<String>;

    /// Drop `key`. Returns whether an entry existed; a missing key is not an error.
    fn forget(&self, key: &str) -> Result<bool>;
}

/// Process-local volatile backend.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryCacheBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn remember(&self, key: &str, ttl: Option<Duration>, loader: Loader<'_>) -> Result<String> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if expires_at.is_none_or(|at| Instant::now() < at) {
                return Ok(value.clone());
            }
        }

        let value = loader()?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), (value.clone(), expires_at));
        Ok(value)
    }

    fn forget(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    expires_at: Option<DateTime<Utc>>,
    value: String,
}

/// Backend storing one JSON file per key in a directory shared by processes.
#[derive(Debug)]
pub struct FileCacheBackend {
    directory: PathBuf,
}

impl FileCacheBackend {
    /// Create a backend rooted at `directory`, creating it if needed.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            Error::Cache(format!(
                "Failed to create cache directory {}: {e}",
                directory.display()
            ))
        })?;
        Ok(Self { directory })
    }

    /// Get the cache directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Percent-encodes the key so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                    char::from(b).to_string()
                } else {
                    format!("%{b:02X}")
                }
            })
            .collect();
        self.directory.join(format!("{file}.json"))
    }

    fn read_live(&self, path: &Path) -> Result<Option<String>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Cache(format!("Failed to read {}: {e}", path.display()))),
        };

        // A torn or foreign file counts as a miss and gets overwritten.
        let entry: FileEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry {}: {e}", path.display());
                return Ok(None);
            }
        };

        if entry.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }
}

impl CacheBackend for FileCacheBackend {
    fn remember(&self, key: &str, ttl: Option<Duration>, loader: Loader<'_>) -> Result<String> {
        let path = self.path_for(key);
        if let Some(value) = self.read_live(&path)? {
            return Ok(value);
        }

        let value = loader()?;
        let expires_at = match ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| Error::Cache(format!("Invalid cache TTL: {e}")))?,
            ),
            None => None,
        };
        let entry = FileEntry {
            expires_at,
            value: value.clone(),
        };

        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec(&entry)?)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| Error::Cache(format!("Failed to write {}: {e}", path.display())))?;

        Ok(value)
    }

    fn forget(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Cache(format!("Failed to forget `{key}`: {e}"))),
        }
    }
}

/// Named cache stores the configuration can select from.
#[derive(Debug, Clone)]
pub struct CacheStores {
    default: Arc<dyn CacheBackend>,
    named: HashMap<String, Arc<dyn CacheBackend>>,
}

impl Default for CacheStores {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }
}

impl CacheStores {
    /// Create a registry whose "default" store is `default`.
    pub fn new(default: Arc<dyn CacheBackend>) -> Self {
        Self {
            default,
            named: HashMap::new(),
        }
    }

    /// Register a named store.
    pub fn with_store(mut self, name: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        self.named.insert(name.into(), backend);
        self
    }

    /// Resolve a configured store name. "default" selects the default store;
    /// an unknown name falls back to a fresh volatile store.
    pub fn select(&self, name: &str) -> Arc<dyn CacheBackend> {
        if name == "default" {
            return self.default.clone();
        }
        match self.named.get(name) {
            Some(backend) => backend.clone(),
            None => {
                log::warn!("Unknown cache store `{name}`, using a process-local volatile store");
                Arc::new(MemoryCacheBackend::new())
            }
        }
    }
}

/// Attribute-equality filter applied to a copy of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    id: Option<EntityId>,
    name: Option<String>,
    guard: Option<String>,
}

impl CatalogFilter {
    /// A filter matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the id.
    pub fn id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Require the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require the guard.
    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Check an entity against every set attribute.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        self.id.is_none_or(|id| id == entity.id())
            && self.name.as_deref().is_none_or(|name| name == entity.name())
            && self.guard.as_deref().is_none_or(|guard| guard == entity.guard())
    }
}

/// In-process holder state. `Loaded` with an empty catalog is distinct from
/// `Unloaded`.
#[derive(Debug)]
enum Holder<T> {
    Unloaded,
    Loaded(Arc<Vec<T>>),
}

/// Read-through cache of the permission and group catalogs.
#[derive(Debug)]
pub struct CatalogCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    permissions: RwLock<Holder<Permission>>,
    groups: RwLock<Holder<Group>>,
    metrics: RegistrarMetrics,
}

impl CatalogCache {
    /// Create a cache over the store selected by `config.store`.
    pub fn new(config: CacheConfig, stores: &CacheStores, metrics: RegistrarMetrics) -> Self {
        Self {
            backend: stores.select(&config.store),
            config,
            permissions: RwLock::new(Holder::Unloaded),
            groups: RwLock::new(Holder::Unloaded),
            metrics,
        }
    }

    /// Permissions matching `filter`, each carrying its granting role ids.
    pub fn permissions(
        &self,
        store: &dyn EntityStore,
        filter: &CatalogFilter,
    ) -> Result<Vec<Permission>> {
        let catalog = self.snapshot(&self.permissions, &self.config.permission_key, || {
            load_permission_catalog(store)
        })?;
        Ok(catalog.iter().filter(|p| filter.matches(*p)).cloned().collect())
    }

    /// Groups matching `filter`, each carrying its role and permission ids.
    pub fn groups(&self, store: &dyn EntityStore, filter: &CatalogFilter) -> Result<Vec<Group>> {
        let catalog = self.snapshot(&self.groups, &self.config.group_key, || {
            load_group_catalog(store)
        })?;
        Ok(catalog.iter().filter(|g| filter.matches(*g)).cloned().collect())
    }

    /// Whether each catalog is currently held in-process, as (permissions, groups).
    pub fn is_loaded(&self) -> (bool, bool) {
        let permissions = matches!(
            *self.permissions.read().unwrap_or_else(|e| e.into_inner()),
            Holder::Loaded(_)
        );
        let groups = matches!(
            *self.groups.read().unwrap_or_else(|e| e.into_inner()),
            Holder::Loaded(_)
        );
        (permissions, groups)
    }

    /// Clear both in-process holders and forget both shared entries.
    pub fn invalidate(&self) -> Result<()> {
        *self.permissions.write().unwrap_or_else(|e| e.into_inner()) = Holder::Unloaded;
        *self.groups.write().unwrap_or_else(|e| e.into_inner()) = Holder::Unloaded;

        let forgot_permissions = self.backend.forget(&self.config.permission_key)?;
        let forgot_groups = self.backend.forget(&self.config.group_key)?;
        self.metrics.record_invalidation();

        log::debug!(
            "Catalog cache invalidated (shared permissions entry: {forgot_permissions}, groups entry: {forgot_groups})"
        );
        Ok(())
    }

    fn snapshot<T, F>(&self, holder: &RwLock<Holder<T>>, key: &str, load: F) -> Result<Arc<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Result<Vec<T>>,
    {
        if let Holder::Loaded(catalog) = &*holder.read().unwrap_or_else(|e| e.into_inner()) {
            self.metrics.record_catalog_hit();
            return Ok(catalog.clone());
        }

        // Concurrent first loads may both reach this point; the load is a pure
        // read and the last write wins.
        self.metrics.record_catalog_load();
        let mut loader = || -> Result<String> { Ok(serde_json::to_string(&load()?)?) };
        let payload = self.backend.remember(key, self.config.expiration.ttl(), &mut loader)?;
        let catalog: Arc<Vec<T>> = Arc::new(serde_json::from_str(&payload)?);

        log::debug!("Catalog `{key}` loaded with {} entries", catalog.len());

        *holder.write().unwrap_or_else(|e| e.into_inner()) = Holder::Loaded(catalog.clone());
        Ok(catalog)
    }
}

/// Load every permission together with the roles granting it.
pub fn load_permission_catalog(store: &dyn EntityStore) -> Result<Vec<Permission>> {
    let mut granted_by: HashMap<EntityId, BTreeSet<EntityId>> = HashMap::new();
    for role in store.all(EntityKind::Role)? {
        for permission_id in store.related(&Owner::Role(role.id), Relation::RolePermissions)? {
            granted_by.entry(permission_id).or_default().insert(role.id);
        }
    }

    Ok(store
        .all(EntityKind::Permission)?
        .into_iter()
        .map(|record| {
            let roles = granted_by.remove(&record.id).unwrap_or_default();
            Permission::from_record(record, roles)
        })
        .collect())
}

/// Load every group together with its roles and direct permissions.
pub fn load_group_catalog(store: &dyn EntityStore) -> Result<Vec<Group>> {
    store
        .all(EntityKind::Group)?
        .into_iter()
        .map(|record| {
            let owner = Owner::Group(record.id);
            let roles = store.related(&owner, Relation::GroupRoles)?;
            let permissions = store.related(&owner, Relation::GroupPermissions)?;
            Ok(Group::from_record(record, roles, permissions))
        })
        .collect()
}

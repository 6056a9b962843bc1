//! Core registrar implementation.
//!
//! The [`Registrar`] owns the guard resolver and the catalog cache and talks to
//! an [`EntityStore`]. Resolution lives in [`crate::resolution`], mutations in
//! [`crate::assignment`]; this module covers construction, entity creation,
//! reference lookup and subject loading.
//!
//! # Caching
//!
//! Permissions and groups are always read through the catalog cache. Roles are
//! looked up in the store directly: role checks only need the ids already held
//! by subjects, groups and permissions.

#[cfg(feature = "audit")]
use log::info;

use crate::{
    cache::{CacheStores, CatalogCache, CatalogFilter},
    config::RegistrarConfig,
    entity::{Entity, EntityId, EntityKind, EntityRecord, Owner, Relation, SubjectKey},
    error::{Error, Result},
    group::Group,
    guard::GuardResolver,
    metrics::RegistrarMetrics,
    permission::Permission,
    reference::Reference,
    role::Role,
    storage::{EntityStore, MemoryStore},
    subject::Subject,
};
use std::collections::BTreeSet;

/// The registrar: entry point for creating entities, resolving grants and
/// mutating associations.
pub struct Registrar<S = MemoryStore>
where
    S: EntityStore,
{
    store: S,
    config: RegistrarConfig,
    guards: GuardResolver,
    catalog: CatalogCache,
    metrics: RegistrarMetrics,
}

impl Registrar<MemoryStore> {
    /// Create a registrar with default configuration over a fresh memory store.
    pub fn new() -> Self {
        let config = RegistrarConfig::default();
        let metrics = RegistrarMetrics::new();
        Self {
            store: MemoryStore::with_tables(config.tables.clone()),
            guards: GuardResolver::new(config.guards.clone()),
            catalog: CatalogCache::new(config.cache.clone(), &CacheStores::default(), metrics.clone()),
            config,
            metrics,
        }
    }

    /// Create a registrar with custom configuration over a fresh memory store.
    pub fn with_config(config: RegistrarConfig) -> Result<Self> {
        let store = MemoryStore::with_tables(config.tables.clone());
        Self::with_store(store, config)
    }
}

impl Default for Registrar<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registrar<S>
where
    S: EntityStore,
{
    /// Create a registrar over a custom store with default cache stores.
    pub fn with_store(store: S, config: RegistrarConfig) -> Result<Self> {
        Self::with_cache_stores(store, config, CacheStores::default())
    }

    /// Create a registrar over a custom store and a registry of cache stores.
    pub fn with_cache_stores(store: S, config: RegistrarConfig, stores: CacheStores) -> Result<Self> {
        config.validate()?;
        let metrics = RegistrarMetrics::new();
        Ok(Self {
            store,
            guards: GuardResolver::new(config.guards.clone()),
            catalog: CatalogCache::new(config.cache.clone(), &stores, metrics.clone()),
            config,
            metrics,
        })
    }

    /// Get the entity store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Get the guard resolver.
    pub fn guards(&self) -> &GuardResolver {
        &self.guards
    }

    /// Get the catalog cache.
    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    /// Get the metrics collector.
    pub fn metrics(&self) -> &RegistrarMetrics {
        &self.metrics
    }

    /// Flush both catalogs from this process and from the shared backend.
    pub fn forget_cached_permissions(&self) -> Result<()> {
        self.catalog.invalidate()
    }

    /// Permissions in the catalog matching `filter`.
    pub fn permissions(&self, filter: &CatalogFilter) -> Result<Vec<Permission>> {
        self.catalog.permissions(&self.store, filter)
    }

    /// Groups in the catalog matching `filter`.
    pub fn groups(&self, filter: &CatalogFilter) -> Result<Vec<Group>> {
        self.catalog.groups(&self.store, filter)
    }

    // Creation

    /// Create a permission; `guard` defaults to the configured default guard.
    pub fn create_permission(&self, name: &str, guard: Option<&str>) -> Result<Permission> {
        let record = self.create_record(EntityKind::Permission, name, guard)?;
        Ok(Permission::from_record(record, []))
    }

    /// Find a permission by name, creating it if it does not exist.
    pub fn find_or_create_permission(&self, name: &str, guard: Option<&str>) -> Result<Permission> {
        let guard = self.guard_or_default(guard);
        match self.lookup_permission(&CatalogFilter::new().name(name).guard(guard.clone()))? {
            Some(permission) => Ok(permission),
            None => self.create_permission(name, Some(&guard)),
        }
    }

    /// Create a role; `guard` defaults to the configured default guard.
    pub fn create_role(&self, name: &str, guard: Option<&str>) -> Result<Role> {
        let record = self.create_record(EntityKind::Role, name, guard)?;
        Ok(Role::from_record(record))
    }

    /// Find a role by name, creating it if it does not exist.
    pub fn find_or_create_role(&self, name: &str, guard: Option<&str>) -> Result<Role> {
        let guard = self.guard_or_default(guard);
        match self.store.find_by_name(EntityKind::Role, name, &guard)? {
            Some(record) => self.hydrate_role(record),
            None => self.create_role(name, Some(&guard)),
        }
    }

    /// Create a group; `guard` defaults to the configured default guard.
    pub fn create_group(&self, name: &str, guard: Option<&str>) -> Result<Group> {
        let record = self.create_record(EntityKind::Group, name, guard)?;
        Ok(Group::from_record(record, [], []))
    }

    /// Find a group by name, creating it if it does not exist.
    pub fn find_or_create_group(&self, name: &str, guard: Option<&str>) -> Result<Group> {
        let guard = self.guard_or_default(guard);
        match self.lookup_group(&CatalogFilter::new().name(name).guard(guard.clone()))? {
            Some(group) => Ok(group),
            None => self.create_group(name, Some(&guard)),
        }
    }

    fn create_record(&self, kind: EntityKind, name: &str, guard: Option<&str>) -> Result<EntityRecord> {
        if name.trim().is_empty() {
            return Err(Error::InvalidReference(format!("{kind} name cannot be empty")));
        }
        if name.contains('|') {
            return Err(Error::InvalidReference(format!(
                "{kind} name `{name}` cannot contain `|`"
            )));
        }
        let guard = self.guard_or_default(guard);

        if self.store.find_by_name(kind, name, &guard)?.is_some() {
            return Err(Error::DuplicateEntity {
                kind,
                name: name.to_string(),
                guard,
            });
        }
        let record = self.store.create(kind, name, &guard)?;

        #[cfg(feature = "audit")]
        info!("{kind} '{name}' created for guard '{guard}'");

        self.forget_cached_permissions()?;
        Ok(record)
    }

    fn guard_or_default(&self, guard: Option<&str>) -> String {
        guard
            .map(str::to_string)
            .unwrap_or_else(|| self.config.guards.default_guard.clone())
    }

    // Lookup

    /// Find a permission by reference under `guard`.
    pub fn find_permission(
        &self,
        reference: impl Into<Reference<Permission>>,
        guard: Option<&str>,
    ) -> Result<Permission> {
        self.resolve_single(reference.into(), &self.guard_or_default(guard))
    }

    /// Find a role by reference under `guard`, with its associations loaded.
    pub fn find_role(&self, reference: impl Into<Reference<Role>>, guard: Option<&str>) -> Result<Role> {
        self.resolve_single(reference.into(), &self.guard_or_default(guard))
    }

    /// Find a group by reference under `guard`.
    pub fn find_group(&self, reference: impl Into<Reference<Group>>, guard: Option<&str>) -> Result<Group> {
        self.resolve_single(reference.into(), &self.guard_or_default(guard))
    }

    /// Resolve a reference to the distinct entities it names, looking names
    /// and ids up under `guard`. Loaded entities are refreshed by id under
    /// their own guard.
    pub(crate) fn resolve<E>(&self, reference: Reference<E>, guard: &str) -> Result<Vec<E>>
    where
        E: Entity,
        Self: Lookup<E>,
    {
        reference.validate()?;
        let mut resolved: Vec<E> = Vec::new();
        self.resolve_into(reference, guard, &mut resolved)?;

        let mut seen = BTreeSet::new();
        resolved.retain(|entity| seen.insert(entity.id()));
        Ok(resolved)
    }

    fn resolve_into<E>(&self, reference: Reference<E>, guard: &str, out: &mut Vec<E>) -> Result<()>
    where
        E: Entity,
        Self: Lookup<E>,
    {
        match reference {
            Reference::Name(name) if name.contains('|') => {
                self.resolve_into(Reference::names(&name), guard, out)?;
            }
            Reference::Name(name) => {
                let entity = <Self as Lookup<E>>::lookup_name(self, &name, guard)?
                    .ok_or_else(|| Error::not_named(E::KIND, &name))?;
                out.push(entity);
            }
            Reference::Id(id) => {
                let entity = <Self as Lookup<E>>::lookup_id(self, id, guard)?
                    .ok_or_else(|| Error::not_with_id(E::KIND, id))?;
                out.push(entity);
            }
            Reference::Entity(entity) => {
                let fresh = <Self as Lookup<E>>::lookup_id(self, entity.id(), entity.guard())?;
                out.push(fresh.unwrap_or(entity));
            }
            Reference::Many(references) => {
                for reference in references {
                    self.resolve_into(reference, guard, out)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a reference that must name exactly one entity. A name is
    /// looked up literally, without splitting on `|`.
    pub(crate) fn resolve_single<E>(&self, reference: Reference<E>, guard: &str) -> Result<E>
    where
        E: Entity,
        Self: Lookup<E>,
    {
        if let Reference::Name(name) = &reference {
            reference.validate()?;
            return <Self as Lookup<E>>::lookup_name(self, name, guard)?
                .ok_or_else(|| Error::not_named(E::KIND, name));
        }

        let mut resolved = self.resolve(reference, guard)?;
        match resolved.len() {
            1 => Ok(resolved.remove(0)),
            n => Err(Error::InvalidReference(format!(
                "expected a single {}, got {n}",
                E::KIND
            ))),
        }
    }

    fn lookup_permission(&self, filter: &CatalogFilter) -> Result<Option<Permission>> {
        Ok(self.permissions(filter)?.into_iter().next())
    }

    fn lookup_group(&self, filter: &CatalogFilter) -> Result<Option<Group>> {
        Ok(self.groups(filter)?.into_iter().next())
    }

    pub(crate) fn hydrate_role(&self, record: EntityRecord) -> Result<Role> {
        let permissions = self
            .store
            .related(&Owner::Role(record.id), Relation::RolePermissions)?;
        let groups: Vec<EntityId> = self
            .groups(&CatalogFilter::new())?
            .iter()
            .filter(|group| group.has_role_id(record.id))
            .map(Entity::id)
            .collect();
        Ok(Role::from_record(record).with_associations(permissions, groups))
    }

    // Subjects

    /// Load a persisted subject with its roles, groups and direct permissions.
    pub fn load_subject(&self, model_type: &str, key: &str) -> Result<Subject> {
        let mut subject = Subject::persisted(model_type, key);
        self.refresh_subject(&mut subject)?;
        Ok(subject)
    }

    /// Reload every association of a persisted subject.
    pub fn refresh_subject(&self, subject: &mut Subject) -> Result<()> {
        let key = self.persisted_key(subject)?;
        if !self.store.subject_exists(&key)? {
            return Err(Error::Storage(format!("subject {key} does not exist")));
        }
        for relation in [
            Relation::SubjectRoles,
            Relation::SubjectGroups,
            Relation::SubjectPermissions,
        ] {
            self.reload_relation(subject, &key, relation)?;
        }
        Ok(())
    }

    pub(crate) fn persisted_key(&self, subject: &Subject) -> Result<SubjectKey> {
        subject
            .subject_key()
            .ok_or_else(|| Error::SubjectNotPersisted(subject.model_type().to_string()))
    }

    /// Reload one subject association from the store.
    pub(crate) fn reload_relation(
        &self,
        subject: &mut Subject,
        key: &SubjectKey,
        relation: Relation,
    ) -> Result<()> {
        let owner = Owner::Subject(key.clone());
        let ids = self.store.related(&owner, relation)?;
        match relation {
            Relation::SubjectRoles => {
                let guards = self.guards.guards_of(subject);
                let mut roles = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(record) = self.role_record_in(id, &guards)? {
                        roles.push(Role::from_record(record));
                    }
                }
                subject.set_roles(roles);
            }
            Relation::SubjectGroups => {
                let groups = self
                    .groups(&CatalogFilter::new())?
                    .into_iter()
                    .filter(|group| ids.contains(&group.id()))
                    .collect();
                subject.set_groups(groups);
            }
            Relation::SubjectPermissions => subject.set_permissions(ids),
            other => {
                return Err(Error::Storage(format!(
                    "`{}` is not a subject association",
                    self.config.tables.relation(other)
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn role_record_in(&self, id: EntityId, guards: &[String]) -> Result<Option<EntityRecord>> {
        for guard in guards {
            if let Some(record) = self.store.find_by_id(EntityKind::Role, id, guard)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Name and id lookup of one entity kind under a guard.
pub(crate) trait Lookup<E> {
    fn lookup_name(&self, name: &str, guard: &str) -> Result<Option<E>>;
    fn lookup_id(&self, id: EntityId, guard: &str) -> Result<Option<E>>;
}

impl<S: EntityStore> Lookup<Permission> for Registrar<S> {
    fn lookup_name(&self, name: &str, guard: &str) -> Result<Option<Permission>> {
        self.lookup_permission(&CatalogFilter::new().name(name).guard(guard))
    }

    fn lookup_id(&self, id: EntityId, guard: &str) -> Result<Option<Permission>> {
        self.lookup_permission(&CatalogFilter::new().id(id).guard(guard))
    }
}

impl<S: EntityStore> Lookup<Group> for Registrar<S> {
    fn lookup_name(&self, name: &str, guard: &str) -> Result<Option<Group>> {
        self.lookup_group(&CatalogFilter::new().name(name).guard(guard))
    }

    fn lookup_id(&self, id: EntityId, guard: &str) -> Result<Option<Group>> {
        self.lookup_group(&CatalogFilter::new().id(id).guard(guard))
    }
}

impl<S: EntityStore> Lookup<Role> for Registrar<S> {
    fn lookup_name(&self, name: &str, guard: &str) -> Result<Option<Role>> {
        self.store
            .find_by_name(EntityKind::Role, name, guard)?
            .map(|record| self.hydrate_role(record))
            .transpose()
    }

    fn lookup_id(&self, id: EntityId, guard: &str) -> Result<Option<Role>> {
        self.store
            .find_by_id(EntityKind::Role, id, guard)?
            .map(|record| self.hydrate_role(record))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;

    #[test]
    fn test_duplicate_creation_fails() {
        let registrar = Registrar::new();

        registrar.create_permission("edit-articles", Some("web")).unwrap();
        let err = registrar
            .create_permission("edit-articles", Some("web"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { kind: EntityKind::Permission, .. }));

        // Same name under another guard is a different permission.
        assert!(registrar.create_permission("edit-articles", Some("api")).is_ok());
    }

    #[test]
    fn test_find_or_create_is_stable() {
        let registrar = Registrar::new();

        let first = registrar.find_or_create_permission("edit-articles", None).unwrap();
        let second = registrar.find_or_create_permission("edit-articles", None).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(first.guard(), "web");

        let role = registrar.find_or_create_role("writer", None).unwrap();
        assert_eq!(registrar.find_or_create_role("writer", None).unwrap().id(), role.id());

        let group = registrar.find_or_create_group("staff", None).unwrap();
        assert_eq!(registrar.find_or_create_group("staff", None).unwrap().id(), group.id());
    }

    #[test]
    fn test_creation_rejects_empty_names() {
        let registrar = Registrar::new();
        assert!(matches!(
            registrar.create_role(" ", None),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn test_creation_rejects_pipe_names() {
        let registrar = Registrar::new();
        for result in [
            registrar.create_permission("x|y", None).map(|_| ()),
            registrar.create_role("x|y", None).map(|_| ()),
            registrar.find_or_create_group("x|y", None).map(|_| ()),
        ] {
            assert!(matches!(result, Err(Error::InvalidReference(_))));
        }
        assert_eq!(registrar.store().entity_count(EntityKind::Permission), 0);
    }

    #[test]
    fn test_single_name_is_not_split() {
        let registrar = Registrar::new();
        registrar.create_permission("x", None).unwrap();
        registrar.create_permission("y", None).unwrap();

        let err = registrar.find_permission("x|y", None).unwrap_err();
        assert_eq!(err.to_string(), "There is no permission named `x|y`");
    }

    #[test]
    fn test_find_by_reference() {
        let registrar = Registrar::new();
        let edit = registrar.create_permission("edit", None).unwrap();

        assert_eq!(registrar.find_permission("edit", None).unwrap().id(), edit.id());
        assert_eq!(registrar.find_permission(edit.id(), None).unwrap().name(), "edit");

        let err = registrar.find_permission("missing", None).unwrap_err();
        assert!(err.is_not_found());

        let err = registrar.find_group(99u64, None).unwrap_err();
        assert_eq!(err.to_string(), "There is no group with id `99`");

        let err = registrar.find_role("edit", Some("api")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_deduplicates() {
        let registrar = Registrar::new();
        let writer = registrar.create_role("writer", None).unwrap();

        let roles = registrar
            .resolve(
                Reference::Many(vec![
                    Reference::Name("writer".into()),
                    Reference::Id(writer.id()),
                    Reference::Entity(writer.clone()),
                ]),
                "web",
            )
            .unwrap();
        assert_eq!(roles.len(), 1);

        assert!(matches!(
            registrar.resolve_single(Reference::<Role>::Many(vec![]), "web"),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RegistrarConfig::default().with_guards(GuardConfig::new(""));
        assert!(matches!(
            Registrar::with_config(config),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unpersisted_subject_cannot_be_refreshed() {
        let registrar = Registrar::new();
        let mut subject = Subject::new("user");
        assert!(matches!(
            registrar.refresh_subject(&mut subject),
            Err(Error::SubjectNotPersisted(_))
        ));
    }
}

//! Entity store abstraction and the in-memory reference store.
//!
//! The registrar never owns durable storage. It talks to an [`EntityStore`]
//! offering row creation, point lookups, full listings, and set-based
//! association writes, the same shape a relational store exposes.

use crate::{
    config::TableNames,
    entity::{EntityId, EntityKind, EntityRecord, Owner, Relation, SubjectKey},
    error::{Error, Result},
};
use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Trait for storing and retrieving entities and their associations.
pub trait EntityStore: Send + Sync {
    /// Create an entity; fails with `DuplicateEntity` if `(name, guard)` exists.
    fn create(&self, kind: EntityKind, name: &str, guard: &str) -> Result<EntityRecord>;

    /// Find an entity by name within a guard.
    fn find_by_name(&self, kind: EntityKind, name: &str, guard: &str)
    -> Result<Option<EntityRecord>>;

    /// Find an entity by id within a guard.
    fn find_by_id(&self, kind: EntityKind, id: EntityId, guard: &str)
    -> Result<Option<EntityRecord>>;

    /// List every entity of a kind, ordered by id.
    fn all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>>;

    /// Load the target ids of one association of `owner`.
    fn related(&self, owner: &Owner, relation: Relation) -> Result<BTreeSet<EntityId>>;

    /// Attach `targets` to `owner`; with `detach_others` the set becomes exactly
    /// `targets`, otherwise it is merged.
    fn sync_association(
        &self,
        owner: &Owner,
        relation: Relation,
        targets: &[EntityId],
        detach_others: bool,
    ) -> Result<()>;

    /// Detach one target, or every target when `target` is `None`.
    fn detach_association(
        &self,
        owner: &Owner,
        relation: Relation,
        target: Option<EntityId>,
    ) -> Result<()>;

    /// Insert a subject row of the given model type and return its key.
    fn create_subject(&self, model_type: &str) -> Result<String>;

    /// Check whether a subject row exists.
    fn subject_exists(&self, key: &SubjectKey) -> Result<bool>;

    /// Remove a subject row. Associations must already be detached.
    fn delete_subject(&self, key: &SubjectKey) -> Result<bool>;
}

/// In-memory store using DashMap for thread safety.
///
/// Clones share the same tables, so several registrars built over clones of
/// one store behave like processes sharing a database.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: Arc<TableNames>,
    next_ids: Arc<[AtomicU64; 3]>,
    entities: Arc<DashMap<(EntityKind, EntityId), EntityRecord>>,
    names: Arc<DashMap<(EntityKind, String, String), EntityId>>,
    associations: Arc<DashMap<(String, Owner), BTreeSet<EntityId>>>,
    subjects: Arc<DashSet<SubjectKey>>,
    listings: Arc<AtomicU64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new memory store with default table names.
    pub fn new() -> Self {
        Self::with_tables(TableNames::default())
    }

    /// Create a new memory store keyed by the given table names.
    pub fn with_tables(tables: TableNames) -> Self {
        Self {
            tables: Arc::new(tables),
            next_ids: Arc::new([AtomicU64::new(1), AtomicU64::new(1), AtomicU64::new(1)]),
            entities: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            associations: Arc::new(DashMap::new()),
            subjects: Arc::new(DashSet::new()),
            listings: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of full listings served, i.e. catalog loads hitting the store.
    pub fn listing_count(&self) -> u64 {
        self.listings.load(Ordering::Relaxed)
    }

    /// Get the number of stored entities of a kind.
    pub fn entity_count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|entry| entry.key().0 == kind).count()
    }

    /// Get the number of stored subjects.
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    fn next_id(&self, kind: EntityKind) -> EntityId {
        let counter = match kind {
            EntityKind::Permission => &self.next_ids[0],
            EntityKind::Role => &self.next_ids[1],
            EntityKind::Group => &self.next_ids[2],
        };
        counter.fetch_add(1, Ordering::Relaxed)
    }

    fn association_key(&self, owner: &Owner, relation: Relation) -> (String, Owner) {
        (self.tables.relation(relation).to_string(), owner.clone())
    }

    fn check_owner(&self, owner: &Owner, relation: Relation) -> Result<()> {
        if !relation.accepts(owner) {
            return Err(Error::Storage(format!(
                "{owner} cannot own rows of `{}`",
                self.tables.relation(relation)
            )));
        }
        let exists = match owner {
            Owner::Subject(key) => self.subjects.contains(key),
            Owner::Role(id) => self.entities.contains_key(&(EntityKind::Role, *id)),
            Owner::Group(id) => self.entities.contains_key(&(EntityKind::Group, *id)),
        };
        if !exists {
            return Err(Error::Storage(format!("{owner} does not exist")));
        }
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn create(&self, kind: EntityKind, name: &str, guard: &str) -> Result<EntityRecord> {
        match self
            .names
            .entry((kind, name.to_string(), guard.to_string()))
        {
            Entry::Occupied(_) => Err(Error::DuplicateEntity {
                kind,
                name: name.to_string(),
                guard: guard.to_string(),
            }),
            Entry::Vacant(slot) => {
                let record = EntityRecord {
                    id: self.next_id(kind),
                    name: name.to_string(),
                    guard: guard.to_string(),
                };
                slot.insert(record.id);
                self.entities.insert((kind, record.id), record.clone());
                Ok(record)
            }
        }
    }

    fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        guard: &str,
    ) -> Result<Option<EntityRecord>> {
        let id = match self
            .names
            .get(&(kind, name.to_string(), guard.to_string()))
        {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.entities.get(&(kind, id)).map(|r| r.clone()))
    }

    fn find_by_id(
        &self,
        kind: EntityKind,
        id: EntityId,
        guard: &str,
    ) -> Result<Option<EntityRecord>> {
        Ok(self
            .entities
            .get(&(kind, id))
            .filter(|record| record.guard == guard)
            .map(|record| record.clone()))
    }

    fn all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.listings.fetch_add(1, Ordering::Relaxed);

        let mut records: Vec<EntityRecord> = self
            .entities
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn related(&self, owner: &Owner, relation: Relation) -> Result<BTreeSet<EntityId>> {
        Ok(self
            .associations
            .get(&self.association_key(owner, relation))
            .map(|targets| targets.clone())
            .unwrap_or_default())
    }

    fn sync_association(
        &self,
        owner: &Owner,
        relation: Relation,
        targets: &[EntityId],
        detach_others: bool,
    ) -> Result<()> {
        self.check_owner(owner, relation)?;

        let target_kind = relation.target_kind();
        if let Some(missing) = targets
            .iter()
            .find(|id| !self.entities.contains_key(&(target_kind, **id)))
        {
            return Err(Error::Storage(format!(
                "{target_kind} #{missing} does not exist"
            )));
        }

        let mut current = self
            .associations
            .entry(self.association_key(owner, relation))
            .or_default();
        if detach_others {
            current.clear();
        }
        current.extend(targets.iter().copied());
        Ok(())
    }

    fn detach_association(
        &self,
        owner: &Owner,
        relation: Relation,
        target: Option<EntityId>,
    ) -> Result<()> {
        let key = self.association_key(owner, relation);
        match target {
            Some(id) => {
                if let Some(mut current) = self.associations.get_mut(&key) {
                    current.remove(&id);
                }
            }
            None => {
                self.associations.remove(&key);
            }
        }
        Ok(())
    }

    fn create_subject(&self, model_type: &str) -> Result<String> {
        let key = Uuid::new_v4().to_string();
        self.subjects.insert(SubjectKey::new(model_type, key.clone()));
        Ok(key)
    }

    fn subject_exists(&self, key: &SubjectKey) -> Result<bool> {
        Ok(self.subjects.contains(key))
    }

    fn delete_subject(&self, key: &SubjectKey) -> Result<bool> {
        Ok(self.subjects.remove(key).is_some())
    }
}

//! Guard resolution: which authentication contexts a subject acts under.

use crate::{
    config::GuardConfig,
    entity::{Entity, EntityKind},
    error::{Error, Result},
    subject::Subject,
};

/// Maps subject types to guards and rejects cross-guard grants.
#[derive(Debug, Clone)]
pub struct GuardResolver {
    config: GuardConfig,
}

impl GuardResolver {
    /// Create a resolver over the given guard configuration.
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Every guard serving the model type, in declaration order, falling back
    /// to the configured default guard.
    pub fn guards_for_type(&self, model_type: &str) -> Vec<String> {
        let mut guards: Vec<String> = Vec::new();
        for mapping in &self.config.mappings {
            if mapping.model == model_type && !guards.contains(&mapping.guard) {
                guards.push(mapping.guard.clone());
            }
        }
        if guards.is_empty() {
            guards.push(self.config.default_guard.clone());
        }
        guards
    }

    /// Guard a newly created entity or a lookup defaults to for this type.
    pub fn default_guard(&self, model_type: &str) -> String {
        self.config
            .mappings
            .iter()
            .find(|mapping| mapping.model == model_type)
            .map(|mapping| mapping.guard.clone())
            .unwrap_or_else(|| self.config.default_guard.clone())
    }

    /// Guards the subject acts under. An explicit guard on the subject wins.
    pub fn guards_of(&self, subject: &Subject) -> Vec<String> {
        match subject.guard() {
            Some(guard) => vec![guard.to_string()],
            None => self.guards_for_type(subject.model_type()),
        }
    }

    /// Default guard of a specific subject.
    pub fn subject_default_guard(&self, subject: &Subject) -> String {
        match subject.guard() {
            Some(guard) => guard.to_string(),
            None => self.default_guard(subject.model_type()),
        }
    }

    /// Fail with `GuardMismatch` unless the entity's guard serves the subject.
    pub fn ensure_match<E: Entity>(&self, entity: &E, subject: &Subject) -> Result<()> {
        let guards = self.guards_of(subject);
        ensure_guard(E::KIND, entity.guard(), &guards)
    }
}

/// Fail with `GuardMismatch` unless `entity_guard` is one of `guards`.
pub(crate) fn ensure_guard(kind: EntityKind, entity_guard: &str, guards: &[String]) -> Result<()> {
    if guards.iter().any(|guard| guard == entity_guard) {
        return Ok(());
    }

    log::warn!("{kind} guard `{entity_guard}` does not match any of {guards:?}");

    Err(Error::GuardMismatch {
        kind,
        entity_guard: entity_guard.to_string(),
        subject_guards: guards.to_vec(),
    })
}

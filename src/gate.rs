//! Pre-check hook for a host authorization gate.

use crate::{
    core::Registrar,
    error::{Error, Result},
    storage::EntityStore,
    subject::Subject,
};

/// Outcome of a gate pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateDecision {
    /// The subject holds the permission.
    Granted,
    /// The subject lacks the permission and the gate is authoritative.
    Denied,
    /// Let the host's other checks decide.
    NoOpinion,
}

impl GateDecision {
    /// Returns true if the subject holds the permission.
    pub fn is_granted(&self) -> bool {
        matches!(self, GateDecision::Granted)
    }

    /// Host convention: `Some(true)` grants, `Some(false)` denies, `None`
    /// defers.
    pub fn as_option(&self) -> Option<bool> {
        match self {
            GateDecision::Granted => Some(true),
            GateDecision::Denied => Some(false),
            GateDecision::NoOpinion => None,
        }
    }
}

/// A pre-check a host gate consults before its own policies.
pub trait Gate {
    /// Decide whether `subject` may perform `ability`, a permission name.
    fn check(&self, subject: &Subject, ability: &str) -> Result<GateDecision>;
}

impl<S> Gate for Registrar<S>
where
    S: EntityStore,
{
    fn check(&self, subject: &Subject, ability: &str) -> Result<GateDecision> {
        match self.has_permission_to(subject, ability) {
            Ok(true) => Ok(GateDecision::Granted),
            Ok(false) if self.config().gate.authoritative => Ok(GateDecision::Denied),
            Ok(false) => Ok(GateDecision::NoOpinion),
            Err(err) if err.is_not_found() => {
                self.metrics().record_error("entity_does_not_exist");
                log::debug!("gate has no opinion on unknown ability `{ability}`");
                Ok(GateDecision::NoOpinion)
            }
            Err(Error::InvalidReference(reason)) => {
                self.metrics().record_error("invalid_reference");
                log::debug!("gate has no opinion on ability `{ability}`: {reason}");
                Ok(GateDecision::NoOpinion)
            }
            Err(err) => Err(err),
        }
    }
}

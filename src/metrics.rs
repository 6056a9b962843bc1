//! Metrics collection for the registrar.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for registrar operations.
///
/// Clones share counters, so the catalog cache and the registrar can both hold
/// one.
#[derive(Debug, Clone, Default)]
pub struct RegistrarMetrics {
    /// Number of permission checks performed.
    pub permission_checks: Arc<AtomicU64>,
    /// Catalog reads served from the in-process holder.
    pub catalog_hits: Arc<AtomicU64>,
    /// Catalog reads that went to the shared backend (and possibly the store).
    pub catalog_loads: Arc<AtomicU64>,
    /// Number of catalog invalidations.
    pub invalidations: Arc<AtomicU64>,
    /// Number of association writes adding entries.
    pub assignments: Arc<AtomicU64>,
    /// Number of association writes removing entries.
    pub removals: Arc<AtomicU64>,
    /// Error counts by kind.
    pub error_counts: Arc<DashMap<String, AtomicU64>>,
}

impl RegistrarMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permission check.
    pub fn record_permission_check(&self) {
        self.permission_checks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a catalog read served in-process.
    pub fn record_catalog_hit(&self) {
        self.catalog_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a catalog (re)load.
    pub fn record_catalog_load(&self) {
        self.catalog_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invalidation.
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an assignment.
    pub fn record_assignment(&self) {
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removal.
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error.
    pub fn record_error(&self, error_type: &str) {
        self.error_counts
            .entry(error_type.to_string())
            .and_modify(|count| {
                count.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| AtomicU64::new(1));
    }

    /// Share of catalog reads served without a reload.
    pub fn catalog_hit_ratio(&self) -> f64 {
        let hits = self.catalog_hits.load(Ordering::Relaxed);
        let loads = self.catalog_loads.load(Ordering::Relaxed);
        let total = hits + loads;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get metrics summary.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            permission_checks: self.permission_checks.load(Ordering::Relaxed),
            catalog_hits: self.catalog_hits.load(Ordering::Relaxed),
            catalog_loads: self.catalog_loads.load(Ordering::Relaxed),
            catalog_hit_ratio: self.catalog_hit_ratio(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            assignments: self.assignments.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            error_counts: self
                .error_counts
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.permission_checks.store(0, Ordering::Relaxed);
        self.catalog_hits.store(0, Ordering::Relaxed);
        self.catalog_loads.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.assignments.store(0, Ordering::Relaxed);
        self.removals.store(0, Ordering::Relaxed);
        self.error_counts.clear();
    }
}

/// Summary of metrics.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub permission_checks: u64,
    pub catalog_hits: u64,
    pub catalog_loads: u64,
    pub catalog_hit_ratio: f64,
    pub invalidations: u64,
    pub assignments: u64,
    pub removals: u64,
    pub error_counts: HashMap<String, u64>,
}

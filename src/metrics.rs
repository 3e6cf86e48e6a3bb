//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Remote fetch metrics
    pub static ref REMOTE_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("roost_remote_fetches_total", "Total number of remote timeline fetches"),
        &["platform", "request", "outcome"]
    ).expect("metric can be created");

    // Cache store metrics
    pub static ref CACHE_TRANSACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("roost_cache_transactions_total", "Total number of cache write transactions"),
        &["operation"]
    ).expect("metric can be created");

    // Optimistic mutation metrics
    pub static ref MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("roost_mutations_total", "Total number of optimistic mutations"),
        &["action", "outcome"]
    ).expect("metric can be created");
    pub static ref MUTATION_ROLLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("roost_mutation_rollbacks_total", "Total number of optimistic-mutation rollbacks"),
        &["action"]
    ).expect("metric can be created");

    // Error metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("roost_errors_total", "Total number of engine errors"),
        &["kind", "platform"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
///
/// Call once during engine initialization. Registering twice is an error,
/// so this is not idempotent.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(REMOTE_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_TRANSACTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MUTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MUTATION_ROLLBACKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;
    Ok(())
}

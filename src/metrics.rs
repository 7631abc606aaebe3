//! Prometheus metrics registry and instruments.
//!
//! This module is layer-agnostic and can be used from any part of the
//! pipeline.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Ingestion metrics
    pub static ref ACTIVITIES_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_activities_processed_total", "Total number of inbound activities processed"),
        &["verb", "outcome"]
    ).expect("metric can be created");

    // Coordination metrics
    pub static ref LOCK_CONTENTION_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_lock_contention_total", "Lock acquisitions abandoned after the bounded wait"),
        &["namespace"]
    ).expect("metric can be created");
    pub static ref TOMBSTONE_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_tombstone_writes_total", "Tombstones recorded for deletes without a local status"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref TOMBSTONE_SUPPRESSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_tombstone_suppressions_total", "Creates suppressed by an earlier-arriving delete"),
        &["cache_name"]
    ).expect("metric can be created");

    // Cache metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");

    // Side-effect metrics
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedingest_jobs_enqueued_total", "Asynchronous jobs handed to the job queue"),
        &["job"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(ACTIVITIES_PROCESSED_TOTAL.clone()))
        .expect("ACTIVITIES_PROCESSED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(LOCK_CONTENTION_TOTAL.clone()))
        .expect("LOCK_CONTENTION_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOMBSTONE_WRITES_TOTAL.clone()))
        .expect("TOMBSTONE_WRITES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOMBSTONE_SUPPRESSIONS_TOTAL.clone()))
        .expect("TOMBSTONE_SUPPRESSIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(JOBS_ENQUEUED_TOTAL.clone()))
        .expect("JOBS_ENQUEUED_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Session Metrics
    pub static ref SESSION_LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_session_logins_total", "Total number of login attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SESSION_REFRESHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_session_refreshes_total", "Total number of session refresh attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SESSION_VALIDATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_session_validations_total", "Total number of session validations"),
        &["result"]
    ).expect("metric can be created");
    pub static ref SESSION_LOGOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_session_logouts_total", "Total number of logouts"),
        &["outcome"]
    ).expect("metric can be created");

    // Provider Metrics
    pub static ref PROVIDER_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_provider_requests_total", "Total number of token endpoint requests"),
        &["grant", "outcome"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("authrelay_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authrelay_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SESSION_LOGINS_TOTAL.clone()))
        .expect("SESSION_LOGINS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSION_REFRESHES_TOTAL.clone()))
        .expect("SESSION_REFRESHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSION_VALIDATIONS_TOTAL.clone()))
        .expect("SESSION_VALIDATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSION_LOGOUTS_TOTAL.clone()))
        .expect("SESSION_LOGOUTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROVIDER_REQUESTS_TOTAL.clone()))
        .expect("PROVIDER_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_SIZE.clone()))
        .expect("CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

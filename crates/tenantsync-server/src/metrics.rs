//! Prometheus metrics registry for tenantsync
//!
//! Counters for sync operations, merge outcomes, schema statements, store
//! traffic and HTTP requests. Served as text on `/metrics`.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: sync operations by (operation, status)
    pub sync_operations_total: IntCounterVec,
    /// Counter: pushed records by result (merged, stale)
    pub merged_records_total: IntCounterVec,
    /// Counter: migration statements by result (applied, warning)
    pub schema_statements_total: IntCounterVec,
    /// Counter: object store bytes by direction (upload, download)
    pub store_bytes_total: IntCounterVec,
    /// Counter: HTTP requests by (route, status)
    pub http_requests_total: IntCounterVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("tenantsync".to_string()), None)?;

        let sync_operations_total = IntCounterVec::new(
            Opts::new("sync_operations_total", "Total sync operations"),
            &["operation", "status"],
        )?;
        registry.register(Box::new(sync_operations_total.clone()))?;

        let merged_records_total = IntCounterVec::new(
            Opts::new("merged_records_total", "Pushed records by merge result"),
            &["result"],
        )?;
        registry.register(Box::new(merged_records_total.clone()))?;

        let schema_statements_total = IntCounterVec::new(
            Opts::new("schema_statements_total", "Schema migration statements"),
            &["result"],
        )?;
        registry.register(Box::new(schema_statements_total.clone()))?;

        let store_bytes_total = IntCounterVec::new(
            Opts::new("store_bytes_total", "Bytes moved to and from the object store"),
            &["direction"],
        )?;
        registry.register(Box::new(store_bytes_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            sync_operations_total,
            merged_records_total,
            schema_statements_total,
            store_bytes_total,
            http_requests_total,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record a sync operation outcome.
    pub fn record_sync_operation(&self, operation: &str, status: &str) {
        self.sync_operations_total
            .with_label_values(&[operation, status])
            .inc();
    }

    /// Record merged and stale record counts of one push.
    pub fn record_merge(&self, merged: u64, stale: u64) {
        self.merged_records_total
            .with_label_values(&["merged"])
            .inc_by(merged);
        self.merged_records_total
            .with_label_values(&["stale"])
            .inc_by(stale);
    }

    /// Record schema statements applied or downgraded to warnings.
    pub fn record_schema_statements(&self, result: &str, count: u64) {
        self.schema_statements_total
            .with_label_values(&[result])
            .inc_by(count);
    }

    /// Record bytes moved in a given direction.
    pub fn record_store_bytes(&self, direction: &str, bytes: u64) {
        self.store_bytes_total
            .with_label_values(&[direction])
            .inc_by(bytes);
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, route: &str, status: u16) {
        self.http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

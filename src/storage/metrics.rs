//! Metrics Collection
//!
//! Side-channel consumer for structured operation events. Every adapter
//! reports one event per call; absence of a real collector must not change
//! adapter behavior, so the default is a no-op implementation rather than a
//! nullable field.

use crate::error::{Error, Result};
use crate::storage::class::StorageClass;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;

// =============================================================================
// Collector Trait
// =============================================================================

/// Tags attached to every operation event
#[derive(Debug, Clone, Copy)]
pub struct OperationTags<'a> {
    /// Emitting layer ("storage" for bare adapters, "router" for the tier router)
    pub layer: &'static str,
    /// Storage class of the serving adapter
    pub storage_class: StorageClass,
    /// Coarse keyspace bucket derived from the key
    pub keyspace: &'a str,
}

/// Consumer of structured operation events
pub trait MetricsCollector: Send + Sync {
    /// Record one storage operation
    ///
    /// `hit` is set only for read operations.
    fn record_operation(
        &self,
        op: &str,
        tags: &OperationTags<'_>,
        duration_ms: f64,
        success: bool,
        hit: Option<bool>,
    );
}

/// Shared collector handle
pub type MetricsCollectorRef = Arc<dyn MetricsCollector>;

// =============================================================================
// No-Op Collector
// =============================================================================

/// Collector that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_operation(
        &self,
        _op: &str,
        _tags: &OperationTags<'_>,
        _duration_ms: f64,
        _success: bool,
        _hit: Option<bool>,
    ) {
    }
}

/// Shared no-op collector
pub fn noop_metrics() -> MetricsCollectorRef {
    Arc::new(NoopMetrics)
}

// =============================================================================
// Prometheus Collector
// =============================================================================

/// Collector exporting operation events as Prometheus series
///
/// Keyspace labels are coarse buckets (see [`crate::storage::keyspace`]) so
/// series cardinality stays bounded by naming convention, not key count.
pub struct PrometheusMetrics {
    operations: IntCounterVec,
    duration_ms: HistogramVec,
    reads: IntCounterVec,
}

impl PrometheusMetrics {
    /// Create the collector and register its series with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let operations = IntCounterVec::new(
            Opts::new(
                "tierstore_operations_total",
                "Storage operations by op, layer, storage class, keyspace and outcome",
            ),
            &["op", "layer", "storage_class", "keyspace", "outcome"],
        )
        .map_err(|e| Error::Internal(format!("metrics init failed: {}", e)))?;

        let duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "tierstore_operation_duration_ms",
                "Storage operation latency in milliseconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]),
            &["op", "layer", "storage_class"],
        )
        .map_err(|e| Error::Internal(format!("metrics init failed: {}", e)))?;

        let reads = IntCounterVec::new(
            Opts::new(
                "tierstore_reads_total",
                "Read operations by storage class, keyspace and hit/miss",
            ),
            &["layer", "storage_class", "keyspace", "result"],
        )
        .map_err(|e| Error::Internal(format!("metrics init failed: {}", e)))?;

        registry
            .register(Box::new(operations.clone()))
            .and_then(|_| registry.register(Box::new(duration_ms.clone())))
            .and_then(|_| registry.register(Box::new(reads.clone())))
            .map_err(|e| Error::Internal(format!("metrics registration failed: {}", e)))?;

        Ok(Self {
            operations,
            duration_ms,
            reads,
        })
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn record_operation(
        &self,
        op: &str,
        tags: &OperationTags<'_>,
        duration_ms: f64,
        success: bool,
        hit: Option<bool>,
    ) {
        let class = tags.storage_class.to_string();
        let outcome = if success { "success" } else { "error" };

        self.operations
            .with_label_values(&[op, tags.layer, &class, tags.keyspace, outcome])
            .inc();
        self.duration_ms
            .with_label_values(&[op, tags.layer, &class])
            .observe(duration_ms);

        if let Some(hit) = hit {
            let result = if hit { "hit" } else { "miss" };
            self.reads
                .with_label_values(&[tags.layer, &class, tags.keyspace, result])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(keyspace: &str) -> OperationTags<'_> {
        OperationTags {
            layer: "storage",
            storage_class: StorageClass::HotCache,
            keyspace,
        }
    }

    #[test]
    fn test_noop_collector_accepts_events() {
        let collector = NoopMetrics;
        collector.record_operation("get", &tags("market_cache"), 1.0, true, Some(true));
        collector.record_operation("put", &tags("analysis"), 2.0, false, None);
    }

    #[test]
    fn test_prometheus_collector_registers_and_counts() {
        let registry = Registry::new();
        let collector = PrometheusMetrics::new(&registry).unwrap();

        collector.record_operation("get", &tags("market_cache"), 0.4, true, Some(true));
        collector.record_operation("get", &tags("market_cache"), 0.6, true, Some(false));
        collector.record_operation("put", &tags("analysis"), 3.0, false, None);

        let families = registry.gather();
        let ops = families
            .iter()
            .find(|f| f.get_name() == "tierstore_operations_total")
            .unwrap();
        let total: u64 = ops
            .get_metric()
            .iter()
            .map(|m| m.get_counter().get_value() as u64)
            .sum();
        assert_eq!(total, 3);

        let reads = families
            .iter()
            .find(|f| f.get_name() == "tierstore_reads_total")
            .unwrap();
        assert_eq!(reads.get_metric().len(), 2); // one hit series, one miss series
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        PrometheusMetrics::new(&registry).unwrap();
        assert!(PrometheusMetrics::new(&registry).is_err());
    }
}

//! Per-Adapter Statistics and Health
//!
//! Every adapter owns one `StatsRecorder`, mutated only by that adapter's
//! own operations. Counters live behind a mutex because the running-mean
//! latency must update together with the operation count; the crate runs on
//! multi-threaded tokio, so lock-free per-field atomics would let the two
//! drift.

use crate::storage::class::StorageClass;
use crate::storage::keyspace::keyspace;
use crate::storage::metrics::{MetricsCollectorRef, OperationTags};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

// =============================================================================
// Storage Stats
// =============================================================================

/// Running per-adapter counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    /// Every call, any kind, any outcome
    pub total_operations: u64,
    /// Reads that found a live value
    pub hits: u64,
    /// Reads that found nothing (or an expired entry)
    pub misses: u64,
    /// Transport/backend failures; misses and disabled-adapter calls are not errors
    pub errors: u64,
    /// Incremental running mean latency over every call, errors included
    pub avg_latency_ms: f64,
    /// Adapter-defined usage unit (live entry count for the ephemeral adapter,
    /// row count for the relational adapter where it is cheap to observe)
    pub storage_used: u64,
    /// Most recent operation of any kind
    pub last_access: Option<DateTime<Utc>>,
}

impl StorageStats {
    /// Hit ratio over reads (0.0 when no reads recorded)
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

// =============================================================================
// Operation Kinds and Outcomes
// =============================================================================

/// Operation kind, as reported to the metrics collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Put,
    Delete,
    List,
}

impl OpKind {
    /// Metrics tag for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Get => "get",
            OpKind::Put => "put",
            OpKind::Delete => "delete",
            OpKind::List => "list",
        }
    }
}

/// Outcome of a single adapter call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// Read served a live value
    Hit,
    /// Read found nothing
    Miss,
    /// Non-read operation completed
    Success,
    /// Backend failure
    Error,
    /// Adapter constructed without a backend handle; counted, not an error
    Disabled,
}

// =============================================================================
// Stats Recorder
// =============================================================================

/// Owns one adapter's counters and forwards each call to the metrics collector
pub struct StatsRecorder {
    inner: Mutex<StorageStats>,
    metrics: MetricsCollectorRef,
    storage_class: StorageClass,
    backend: &'static str,
    /// Whether a miss counts as a successful call for this adapter. The
    /// object-cache adapter reports misses as `success: true`; the relational
    /// and ephemeral adapters report `success: false`.
    miss_is_success: bool,
}

impl StatsRecorder {
    /// Create a recorder for one adapter
    pub fn new(
        storage_class: StorageClass,
        backend: &'static str,
        miss_is_success: bool,
        metrics: MetricsCollectorRef,
    ) -> Self {
        Self {
            inner: Mutex::new(StorageStats::default()),
            metrics,
            storage_class,
            backend,
            miss_is_success,
        }
    }

    /// Backend name this recorder belongs to
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Record one completed call and emit its metrics event
    ///
    /// Returns the measured latency in milliseconds. `key` feeds the keyspace
    /// tag; pass the list prefix (or nothing) for enumeration calls.
    pub fn record(
        &self,
        op: OpKind,
        key: Option<&str>,
        started: Instant,
        outcome: OpOutcome,
    ) -> f64 {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        {
            let mut stats = self.inner.lock();
            stats.total_operations += 1;
            let n = stats.total_operations as f64;
            stats.avg_latency_ms = (stats.avg_latency_ms * (n - 1.0) + latency_ms) / n;
            stats.last_access = Some(Utc::now());

            match outcome {
                OpOutcome::Hit => stats.hits += 1,
                OpOutcome::Miss => stats.misses += 1,
                OpOutcome::Error => stats.errors += 1,
                OpOutcome::Success | OpOutcome::Disabled => {}
            }
        }

        let success = match outcome {
            OpOutcome::Hit | OpOutcome::Success => true,
            OpOutcome::Miss => self.miss_is_success,
            OpOutcome::Error | OpOutcome::Disabled => false,
        };
        let hit = match outcome {
            OpOutcome::Hit => Some(true),
            OpOutcome::Miss => Some(false),
            _ => None,
        };

        let bucket = keyspace(key.unwrap_or(""));
        let tags = OperationTags {
            layer: "storage",
            storage_class: self.storage_class,
            keyspace: &bucket,
        };
        self.metrics
            .record_operation(op.as_str(), &tags, latency_ms, success, hit);

        latency_ms
    }

    /// Set the adapter-defined usage gauge
    pub fn set_storage_used(&self, used: u64) {
        self.inner.lock().storage_used = used;
    }

    /// Defensive copy of the current counters
    pub fn snapshot(&self) -> StorageStats {
        self.inner.lock().clone()
    }
}

// =============================================================================
// Health Report
// =============================================================================

/// Result of a live health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Probe round-trip succeeded and no capacity warnings are active
    pub healthy: bool,
    /// Human-readable, adapter-specific findings
    pub issues: Vec<String>,
}

impl HealthReport {
    /// Healthy report with no findings
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
        }
    }

    /// Unhealthy report carrying one issue
    pub fn unhealthy(issue: impl Into<String>) -> Self {
        Self {
            healthy: false,
            issues: vec![issue.into()],
        }
    }
}

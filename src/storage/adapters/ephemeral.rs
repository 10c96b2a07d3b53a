//! Ephemeral Adapter (process-local tier)
//!
//! Fastest, non-durable cache living only for the process lifetime; used when
//! data does not need to survive a restart, or as the last-resort fallback
//! when durable tiers are unavailable. The map is private to one adapter
//! instance. Internally synchronous, but exposed through the same async
//! contract as the network-bound adapters for interface uniformity.

use crate::storage::adapters::StorageAdapter;
use crate::storage::class::StorageClass;
use crate::storage::metrics::MetricsCollectorRef;
use crate::storage::result::{ListOptions, ResultMetadata, StorageOptions, StorageResult};
use crate::storage::stats::{HealthReport, OpKind, OpOutcome, StatsRecorder, StorageStats};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the ephemeral adapter
#[derive(Debug, Clone)]
pub struct EphemeralConfig {
    /// TTL applied when a write carries none
    pub default_ttl_secs: u64,
    /// How often the background sweep evicts expired entries
    pub sweep_interval: Duration,
    /// Advisory capacity cap; exceeding it only degrades `health_check`
    pub soft_cap_entries: u64,
}

impl Default for EphemeralConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            sweep_interval: Duration::from_secs(60),
            soft_cap_entries: 10_000,
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

#[derive(Debug, Clone)]
struct EphemeralEntry {
    value: Value,
    expires_at_ms: i64,
    #[allow(dead_code)]
    metadata: BTreeMap<String, String>,
}

impl EphemeralEntry {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Evict expired entries; returns how many were removed
fn sweep_expired(entries: &DashMap<String, EphemeralEntry>) -> usize {
    let now_ms = Utc::now().timestamp_millis();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now_ms));
    before.saturating_sub(entries.len())
}

// =============================================================================
// Ephemeral Adapter
// =============================================================================

/// Process-local in-memory adapter with TTL eviction
pub struct EphemeralAdapter {
    entries: Arc<DashMap<String, EphemeralEntry>>,
    config: EphemeralConfig,
    stats: Arc<StatsRecorder>,
    sweep_cancel: CancellationToken,
    closed: AtomicBool,
}

impl EphemeralAdapter {
    /// Backend identifier
    pub const BACKEND: &'static str = "memory";

    /// Create the adapter and start its background sweep
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: EphemeralConfig, metrics: MetricsCollectorRef) -> Self {
        let entries: Arc<DashMap<String, EphemeralEntry>> = Arc::new(DashMap::new());
        let stats = Arc::new(StatsRecorder::new(
            StorageClass::Ephemeral,
            Self::BACKEND,
            false,
            metrics,
        ));
        let sweep_cancel = CancellationToken::new();

        let task_entries = entries.clone();
        let task_stats = stats.clone();
        let task_cancel = sweep_cancel.clone();
        let interval = config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = sweep_expired(&task_entries);
                        if evicted > 0 {
                            debug!(evicted, remaining = task_entries.len(), "swept expired ephemeral entries");
                        }
                        task_stats.set_storage_used(task_entries.len() as u64);
                    }
                }
            }
        });

        debug!(
            default_ttl = config.default_ttl_secs,
            soft_cap = config.soft_cap_entries,
            "ephemeral adapter initialized"
        );
        Self {
            entries,
            config,
            stats,
            sweep_cancel,
            closed: AtomicBool::new(false),
        }
    }

    fn metadata(&self) -> ResultMetadata {
        ResultMetadata::new(StorageClass::Ephemeral, Self::BACKEND)
    }

    fn refresh_usage(&self) {
        self.stats.set_storage_used(self.entries.len() as u64);
    }
}

enum Lookup {
    Absent,
    Expired,
    Live(Value),
}

#[async_trait]
impl StorageAdapter for EphemeralAdapter {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn storage_class(&self) -> StorageClass {
        StorageClass::Ephemeral
    }

    async fn get(&self, key: &str) -> StorageResult<Value> {
        let started = Instant::now();
        let now_ms = Utc::now().timestamp_millis();

        // The map guard must drop before the remove below
        let lookup = match self.entries.get(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_expired(now_ms) => Lookup::Expired,
            Some(entry) => Lookup::Live(entry.value.clone()),
        };

        match lookup {
            Lookup::Live(value) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Hit);
                StorageResult::ok(value, self.metadata()).with_latency(latency)
            }
            Lookup::Expired => {
                // An expired entry must be removed before the miss is reported
                self.entries.remove(key);
                self.refresh_usage();
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Miss);
                StorageResult::err("Key expired", self.metadata()).with_latency(latency)
            }
            Lookup::Absent => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Miss);
                StorageResult::err("Key not found", self.metadata()).with_latency(latency)
            }
        }
    }

    async fn put(&self, key: &str, value: &Value, options: &StorageOptions) -> StorageResult<()> {
        let started = Instant::now();
        let ttl = options.ttl.unwrap_or(self.config.default_ttl_secs);
        let entry = EphemeralEntry {
            value: value.clone(),
            expires_at_ms: Utc::now().timestamp_millis() + (ttl as i64) * 1000,
            metadata: options.metadata.clone(),
        };
        self.entries.insert(key.to_string(), entry);
        self.refresh_usage();

        let latency = self
            .stats
            .record(OpKind::Put, Some(key), started, OpOutcome::Success);
        StorageResult::ok_empty(self.metadata().with_ttl(Some(ttl))).with_latency(latency)
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        let started = Instant::now();
        let removed = if self.entries.remove(key).is_some() { 1 } else { 0 };
        self.refresh_usage();

        let latency = self
            .stats
            .record(OpKind::Delete, Some(key), started, OpOutcome::Success);
        StorageResult::ok(removed, self.metadata()).with_latency(latency)
    }

    async fn list(&self, options: &ListOptions) -> StorageResult<Vec<String>> {
        let started = Instant::now();
        let now_ms = Utc::now().timestamp_millis();

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now_ms))
            .map(|entry| entry.key().clone())
            .filter(|key| {
                options
                    .prefix
                    .as_deref()
                    .map(|p| key.starts_with(p))
                    .unwrap_or(true)
            })
            .collect();
        keys.sort();
        if let Some(limit) = options.limit {
            keys.truncate(limit);
        }

        let latency = self.stats.record(
            OpKind::List,
            options.prefix.as_deref(),
            started,
            OpOutcome::Success,
        );
        StorageResult::ok(keys, self.metadata()).with_latency(latency)
    }

    fn stats(&self) -> StorageStats {
        self.stats.snapshot()
    }

    async fn health_check(&self) -> HealthReport {
        let count = self.entries.len() as u64;
        if count > self.config.soft_cap_entries {
            HealthReport::unhealthy(format!(
                "entry count {} exceeds soft cap {}",
                count, self.config.soft_cap_entries
            ))
        } else {
            HealthReport::healthy()
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sweep_cancel.cancel();
        self.entries.clear();
        self.stats.set_storage_used(0);
        debug!("ephemeral adapter closed");
    }
}

impl Drop for EphemeralAdapter {
    fn drop(&mut self) {
        // Stop the sweep even if close() was never called
        self.sweep_cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================

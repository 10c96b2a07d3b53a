//! Tier Router
//!
//! Maps logical storage classes onto registered adapters and implements the
//! cross-tier behaviors no single adapter owns: deterministic read
//! resolution, hit-count promotion, idle demotion, single-hop fallback for
//! writes and deletes, and dual-mode redundant writes.
//!
//! Resolution policy: reads walk the requested class and every colder class
//! in order (hot_cache -> warm_cache -> cold_storage -> ephemeral); the first
//! tier serving the key wins and is reported in `routing.routed_class`.
//! Misses and adapter failures both advance the walk; failures are collected
//! into `routing.adapter_errors`. Writes and deletes retry at most once,
//! against the class's fallback target. The router is the only layer that
//! retries; adapters never do.

use crate::storage::adapters::{StorageAdapter, StorageAdapterRef};
use crate::storage::class::StorageClass;
use crate::storage::compress::{CompressionConfig, PayloadCodec};
use crate::storage::events::TierEvent;
use crate::storage::result::{ListOptions, ResultMetadata, StorageOptions, StorageResult};
use crate::storage::stats::{HealthReport, StorageStats};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Backend tag used on results the router synthesizes itself
const ROUTER_BACKEND: &str = "router";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the tier router
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Reads served by a colder tier before the value is promoted into the
    /// requested class
    pub promotion_threshold: u32,
    /// Idle seconds before `run_demotion_cycle` rewrites a value to the next
    /// colder tier
    pub demotion_idle_secs: u64,
    /// Write every value to the requested class and its fallback target
    pub dual_write: bool,
    /// Compression applied to payloads on demotion
    pub compression: CompressionConfig,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 3,
            demotion_idle_secs: 86_400,
            dual_write: false,
            compression: CompressionConfig::default(),
            event_channel_capacity: 1024,
        }
    }
}

// =============================================================================
// Access Tracking
// =============================================================================

/// Per-key access record backing promotion and idle demotion
///
/// The router tracks access itself because two of the three backends cannot
/// enumerate their keys.
#[derive(Debug, Clone)]
struct AccessRecord {
    hits: u32,
    last_access_ms: i64,
    class: StorageClass,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder registering one adapter per storage class
#[derive(Default)]
pub struct TierRouterBuilder {
    adapters: BTreeMap<StorageClass, StorageAdapterRef>,
    config: RouterConfig,
}

impl TierRouterBuilder {
    /// Start an empty builder with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the router configuration
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an adapter under the class it declares
    ///
    /// A later registration for the same class replaces the earlier one.
    pub fn register(mut self, adapter: StorageAdapterRef) -> Self {
        let class = adapter.storage_class();
        if self.adapters.insert(class, adapter).is_some() {
            warn!(class = %class, "replacing previously registered adapter");
        }
        self
    }

    /// Build the router
    pub fn build(self) -> crate::error::Result<TierRouter> {
        if self.adapters.is_empty() {
            return Err(crate::error::Error::Configuration(
                "tier router requires at least one registered adapter".into(),
            ));
        }
        let (event_tx, _) = broadcast::channel(self.config.event_channel_capacity);
        let registered: Vec<String> = self.adapters.keys().map(|c| c.to_string()).collect();
        info!(classes = ?registered, "tier router initialized");
        Ok(TierRouter {
            adapters: self.adapters,
            codec: PayloadCodec::new(self.config.compression.clone()),
            config: self.config,
            access: DashMap::new(),
            event_tx,
        })
    }
}

// =============================================================================
// Tier Router
// =============================================================================

/// Router over one adapter per storage class
pub struct TierRouter {
    adapters: BTreeMap<StorageClass, StorageAdapterRef>,
    config: RouterConfig,
    access: DashMap<String, AccessRecord>,
    codec: PayloadCodec,
    event_tx: broadcast::Sender<TierEvent>,
}

impl TierRouter {
    /// Start building a router
    pub fn builder() -> TierRouterBuilder {
        TierRouterBuilder::new()
    }

    /// Subscribe to router events
    pub fn subscribe(&self) -> broadcast::Receiver<TierEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: TierEvent) {
        let _ = self.event_tx.send(event);
    }

    fn adapter(&self, class: StorageClass) -> Option<&StorageAdapterRef> {
        self.adapters.get(&class)
    }

    fn router_metadata(&self, class: StorageClass) -> ResultMetadata {
        ResultMetadata::new(class, ROUTER_BACKEND)
    }

    /// Record a served read; returns the accumulated hit count
    fn record_hit(&self, key: &str, class: StorageClass) -> u32 {
        let now_ms = Utc::now().timestamp_millis();
        let mut record = self.access.entry(key.to_string()).or_insert(AccessRecord {
            hits: 0,
            last_access_ms: now_ms,
            class,
        });
        record.hits += 1;
        record.last_access_ms = now_ms;
        record.class = class;
        record.hits
    }

    /// Record a write without counting it as a read hit
    fn touch(&self, key: &str, class: StorageClass) {
        let now_ms = Utc::now().timestamp_millis();
        let mut record = self.access.entry(key.to_string()).or_insert(AccessRecord {
            hits: 0,
            last_access_ms: now_ms,
            class,
        });
        record.last_access_ms = now_ms;
        record.class = class;
    }

    fn reset_hits(&self, key: &str, class: StorageClass) {
        if let Some(mut record) = self.access.get_mut(key) {
            record.hits = 0;
            record.class = class;
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read `key`, resolving across tiers starting at `class`
    pub async fn get(&self, class: StorageClass, key: &str) -> StorageResult<Value> {
        let mut adapter_errors: Vec<String> = Vec::new();

        for chain_class in class.read_chain() {
            let Some(adapter) = self.adapter(chain_class) else {
                continue;
            };
            let mut result = adapter.get(key).await;

            if let Some(stored) = result.data.take().filter(|_| result.success) {
                let (value, sizes) = match self.codec.decode(stored) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!(key, class = %chain_class, error = %e, "stored payload failed to decode");
                        let mut failed =
                            StorageResult::err(e.to_string(), result.metadata);
                        let routing = failed.metadata.routing_mut();
                        routing.routed_class = Some(chain_class);
                        routing.adapter_errors = adapter_errors;
                        return failed;
                    }
                };

                let hits = self.record_hit(key, chain_class);
                let promoted = if chain_class != class && hits >= self.config.promotion_threshold
                {
                    self.promote_value(key, &value, chain_class, class).await
                } else {
                    false
                };

                let routing = result.metadata.routing_mut();
                routing.routed_class = Some(chain_class);
                routing.routed_adapter = Some(adapter.backend().to_string());
                routing.adapter_errors = adapter_errors;
                if let Some(sizes) = sizes {
                    routing.original_size = Some(sizes.original);
                    routing.compressed_size = Some(sizes.compressed);
                }
                if promoted {
                    routing.promoted = true;
                    routing.from_class = Some(chain_class);
                    routing.to_class = Some(class);
                }

                self.emit(TierEvent::Hit {
                    key: key.to_string(),
                    class: chain_class,
                    promoted,
                });
                result.data = Some(value);
                return result;
            }

            // A failed call that is not a miss counts against the tier; a
            // miss (either polarity) just advances the walk.
            if !result.success && !result.is_miss() {
                let reason = result.error.unwrap_or_else(|| "unknown error".into());
                adapter_errors.push(format!("{}: {}", adapter.backend(), reason));
            }
        }

        self.emit(TierEvent::Miss {
            key: key.to_string(),
        });
        let mut missed: StorageResult<Value> =
            StorageResult::err("Key not found", self.router_metadata(class));
        let routing = missed.metadata.routing_mut();
        routing.adapter_errors = adapter_errors;
        missed
    }

    /// Read `key` and deserialize the payload into `T`
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        class: StorageClass,
        key: &str,
    ) -> StorageResult<T> {
        let result = self.get(class, key).await;
        let Some(value) = result.data else {
            return StorageResult {
                success: result.success,
                data: None,
                error: result.error,
                latency_ms: result.latency_ms,
                metadata: result.metadata,
            };
        };
        match serde_json::from_value(value) {
            Ok(typed) => StorageResult {
                success: result.success,
                data: Some(typed),
                error: result.error,
                latency_ms: result.latency_ms,
                metadata: result.metadata,
            },
            Err(e) => {
                let mut failed =
                    StorageResult::err(format!("payload decode failed: {}", e), result.metadata);
                failed.latency_ms = result.latency_ms;
                failed
            }
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `key` to `class`, with dual-mode or single-hop fallback behavior
    /// per configuration
    pub async fn put(
        &self,
        class: StorageClass,
        key: &str,
        value: &Value,
        options: &StorageOptions,
    ) -> StorageResult<()> {
        let Some(primary) = self.adapter(class) else {
            return StorageResult::err(
                format!("no adapter registered for class {}", class),
                self.router_metadata(class),
            );
        };
        let size = serde_json::to_vec(value).map(|v| v.len() as u64).ok();

        if self.config.dual_write {
            if let Some(secondary) = class.fallback_target().and_then(|c| self.adapter(c)) {
                return self
                    .dual_put(class, primary, secondary, key, value, options, size)
                    .await;
            }
        }

        let mut result = primary.put(key, value, options).await;
        if result.success {
            self.touch(key, class);
            let routing = result.metadata.routing_mut();
            routing.routed_class = Some(class);
            routing.routed_adapter = Some(primary.backend().to_string());
            routing.size = size;
            self.emit(TierEvent::Put {
                key: key.to_string(),
                class,
                size: size.unwrap_or(0),
                fallback: false,
            });
            return result;
        }

        // Single fallback hop
        let primary_error = format!(
            "{}: {}",
            primary.backend(),
            result.error.clone().unwrap_or_else(|| "unknown error".into())
        );
        let Some((fallback_class, fallback)) = class
            .fallback_target()
            .and_then(|c| self.adapter(c).map(|a| (c, a)))
        else {
            let routing = result.metadata.routing_mut();
            routing.adapter_errors = vec![primary_error];
            routing.size = size;
            return result;
        };

        warn!(key, from = %class, to = %fallback_class, error = %primary_error, "primary write failed, trying fallback tier");
        let mut fallback_result = fallback.put(key, value, options).await;
        if fallback_result.success {
            self.touch(key, fallback_class);
            let routing = fallback_result.metadata.routing_mut();
            routing.fallback_write = true;
            routing.routed_class = Some(fallback_class);
            routing.routed_adapter = Some(fallback.backend().to_string());
            routing.adapter_errors = vec![primary_error.clone()];
            routing.size = size;
            self.emit(TierEvent::FallbackWrite {
                key: key.to_string(),
                from_class: class,
                to_class: fallback_class,
                error: primary_error,
            });
            self.emit(TierEvent::Put {
                key: key.to_string(),
                class: fallback_class,
                size: size.unwrap_or(0),
                fallback: true,
            });
            return fallback_result;
        }

        let fallback_error = format!(
            "{}: {}",
            fallback.backend(),
            fallback_result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".into())
        );
        let mut failed: StorageResult<()> = StorageResult::err(
            "write failed on primary and fallback tiers",
            self.router_metadata(class),
        );
        let routing = failed.metadata.routing_mut();
        routing.adapter_errors = vec![primary_error, fallback_error];
        routing.size = size;
        failed
    }

    #[allow(clippy::too_many_arguments)]
    async fn dual_put(
        &self,
        class: StorageClass,
        primary: &StorageAdapterRef,
        secondary: &StorageAdapterRef,
        key: &str,
        value: &Value,
        options: &StorageOptions,
        size: Option<u64>,
    ) -> StorageResult<()> {
        let (primary_result, secondary_result) = futures::future::join(
            primary.put(key, value, options),
            secondary.put(key, value, options),
        )
        .await;

        let mut succeeded = Vec::new();
        let mut adapter_errors = Vec::new();
        for (adapter, result) in [(primary, &primary_result), (secondary, &secondary_result)] {
            if result.success {
                succeeded.push(adapter.backend());
            } else {
                adapter_errors.push(format!(
                    "{}: {}",
                    adapter.backend(),
                    result.error.clone().unwrap_or_else(|| "unknown error".into())
                ));
            }
        }

        // A dual write succeeds when at least one tier accepted it
        let mut result = if primary_result.success {
            primary_result
        } else if secondary_result.success {
            secondary_result
        } else {
            StorageResult::err(
                "write failed on both tiers of dual-mode write",
                self.router_metadata(class),
            )
        };

        if result.success {
            self.touch(key, class);
            self.emit(TierEvent::Put {
                key: key.to_string(),
                class,
                size: size.unwrap_or(0),
                fallback: false,
            });
        }
        let routing = result.metadata.routing_mut();
        routing.dual_mode = true;
        routing.routed_class = Some(class);
        routing.routed_adapter = if succeeded.is_empty() {
            None
        } else {
            Some(succeeded.join("+"))
        };
        routing.adapter_errors = adapter_errors;
        routing.size = size;
        result
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Delete `key` from `class`, with a single fallback hop on failure
    pub async fn delete(&self, class: StorageClass, key: &str) -> StorageResult<u64> {
        let Some(primary) = self.adapter(class) else {
            return StorageResult::err(
                format!("no adapter registered for class {}", class),
                self.router_metadata(class),
            );
        };

        let mut result = primary.delete(key).await;
        if result.success {
            self.access.remove(key);
            let routing = result.metadata.routing_mut();
            routing.routed_class = Some(class);
            routing.routed_adapter = Some(primary.backend().to_string());
            self.emit(TierEvent::Delete {
                key: key.to_string(),
                class,
            });
            return result;
        }

        let primary_error = format!(
            "{}: {}",
            primary.backend(),
            result.error.clone().unwrap_or_else(|| "unknown error".into())
        );
        let Some((fallback_class, fallback)) = class
            .fallback_target()
            .and_then(|c| self.adapter(c).map(|a| (c, a)))
        else {
            let routing = result.metadata.routing_mut();
            routing.adapter_errors = vec![primary_error];
            return result;
        };

        warn!(key, from = %class, to = %fallback_class, "primary delete failed, trying fallback tier");
        let mut fallback_result = fallback.delete(key).await;
        if fallback_result.success {
            self.access.remove(key);
            let routing = fallback_result.metadata.routing_mut();
            routing.fallback_delete = true;
            routing.routed_class = Some(fallback_class);
            routing.routed_adapter = Some(fallback.backend().to_string());
            routing.adapter_errors = vec![primary_error];
            self.emit(TierEvent::Delete {
                key: key.to_string(),
                class: fallback_class,
            });
            return fallback_result;
        }

        let fallback_error = format!(
            "{}: {}",
            fallback.backend(),
            fallback_result
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".into())
        );
        let mut failed: StorageResult<u64> = StorageResult::err(
            "delete failed on primary and fallback tiers",
            self.router_metadata(class),
        );
        let routing = failed.metadata.routing_mut();
        routing.adapter_errors = vec![primary_error, fallback_error];
        failed
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// List keys held by the adapter for `class`
    ///
    /// No cross-tier merge: a key may exist in several tiers independently.
    pub async fn list(&self, class: StorageClass, options: &ListOptions) -> StorageResult<Vec<String>> {
        match self.adapter(class) {
            Some(adapter) => adapter.list(options).await,
            None => StorageResult::err(
                format!("no adapter registered for class {}", class),
                self.router_metadata(class),
            ),
        }
    }

    // =========================================================================
    // Promotion / Demotion
    // =========================================================================

    /// Copy the already-read `value` into a warmer class; used by the
    /// hit-threshold path
    async fn promote_value(
        &self,
        key: &str,
        value: &Value,
        from: StorageClass,
        to: StorageClass,
    ) -> bool {
        let Some(target) = self.adapter(to) else {
            return false;
        };
        let written = target.put(key, value, &StorageOptions::default()).await;
        if !written.success {
            warn!(key, from = %from, to = %to, error = ?written.error, "promotion write failed");
            return false;
        }
        self.reset_hits(key, to);
        self.emit(TierEvent::Promote {
            key: key.to_string(),
            from_class: from,
            to_class: to,
        });
        debug!(key, from = %from, to = %to, "promoted value to warmer tier");
        true
    }

    /// Explicitly copy `key` from `from` into the warmer `to` class
    ///
    /// Promotion copies; the source tier keeps its value.
    pub async fn promote(
        &self,
        key: &str,
        from: StorageClass,
        to: StorageClass,
    ) -> StorageResult<()> {
        if !to.is_warmer_than(&from) {
            return StorageResult::err(
                format!("promotion target {} is not warmer than {}", to, from),
                self.router_metadata(from),
            );
        }
        let Some(source) = self.adapter(from) else {
            return StorageResult::err(
                format!("no adapter registered for class {}", from),
                self.router_metadata(from),
            );
        };

        let got = source.get(key).await;
        let Some(stored) = got.data.filter(|_| got.success) else {
            return StorageResult::err(
                got.error.unwrap_or_else(|| "Key not found".into()),
                self.router_metadata(from),
            );
        };
        let value = match self.codec.decode(stored) {
            Ok((value, _)) => value,
            Err(e) => return StorageResult::err(e.to_string(), self.router_metadata(from)),
        };

        if !self.promote_value(key, &value, from, to).await {
            return StorageResult::err(
                format!("promotion write to {} failed", to),
                self.router_metadata(from),
            );
        }

        let mut result = StorageResult::ok_empty(self.router_metadata(to));
        let routing = result.metadata.routing_mut();
        routing.promoted = true;
        routing.from_class = Some(from);
        routing.to_class = Some(to);
        result
    }

    /// Rewrite `key` from `from` into the colder `to` class, compressing the
    /// payload when configured, then evict it from the source tier
    pub async fn demote(
        &self,
        key: &str,
        from: StorageClass,
        to: StorageClass,
    ) -> StorageResult<()> {
        if !from.is_warmer_than(&to) {
            return StorageResult::err(
                format!("demotion target {} is not colder than {}", to, from),
                self.router_metadata(from),
            );
        }
        let (Some(source), Some(target)) = (self.adapter(from), self.adapter(to)) else {
            return StorageResult::err(
                "demotion requires adapters for both classes",
                self.router_metadata(from),
            );
        };

        let got = source.get(key).await;
        let Some(stored) = got.data.filter(|_| got.success) else {
            return StorageResult::err(
                got.error.unwrap_or_else(|| "Key not found".into()),
                self.router_metadata(from),
            );
        };
        // Normalize to the plain payload before re-encoding for the target
        let plain = match self.codec.decode(stored) {
            Ok((value, _)) => value,
            Err(e) => return StorageResult::err(e.to_string(), self.router_metadata(from)),
        };
        let (encoded, sizes) = match self.codec.encode(&plain) {
            Ok(encoded) => encoded,
            Err(e) => return StorageResult::err(e.to_string(), self.router_metadata(from)),
        };

        let written = target.put(key, &encoded, &StorageOptions::default()).await;
        if !written.success {
            return StorageResult::err(
                format!(
                    "demotion write to {} failed: {}",
                    to,
                    written.error.unwrap_or_else(|| "unknown error".into())
                ),
                self.router_metadata(from),
            );
        }

        let mut adapter_errors = Vec::new();
        let evicted = source.delete(key).await;
        if !evicted.success {
            // The copy landed; report the partial failure instead of undoing it
            let reason = evicted.error.unwrap_or_else(|| "unknown error".into());
            warn!(key, from = %from, error = %reason, "source eviction failed after demotion write");
            adapter_errors.push(format!("{}: {}", source.backend(), reason));
        }

        self.reset_hits(key, to);
        self.emit(TierEvent::Demote {
            key: key.to_string(),
            from_class: from,
            to_class: to,
            original_size: sizes.map(|s| s.original),
            compressed_size: sizes.map(|s| s.compressed),
        });
        debug!(key, from = %from, to = %to, compressed = sizes.is_some(), "demoted value to colder tier");

        let mut result = StorageResult::ok_empty(self.router_metadata(to));
        let routing = result.metadata.routing_mut();
        routing.demoted = true;
        routing.from_class = Some(from);
        routing.to_class = Some(to);
        routing.adapter_errors = adapter_errors;
        if let Some(sizes) = sizes {
            routing.original_size = Some(sizes.original);
            routing.compressed_size = Some(sizes.compressed);
        }
        result
    }

    /// Demote every tracked key that has sat idle past the configured
    /// threshold in a tier warmer than cold storage; returns how many moved
    pub async fn run_demotion_cycle(&self) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let cutoff_ms = (self.config.demotion_idle_secs as i64) * 1000;

        let candidates: Vec<(String, StorageClass, StorageClass)> = self
            .access
            .iter()
            .filter(|record| now_ms - record.last_access_ms >= cutoff_ms)
            .filter(|record| record.class.is_warmer_than(&StorageClass::ColdStorage))
            .filter_map(|record| {
                record
                    .class
                    .fallback_target()
                    .map(|target| (record.key().clone(), record.class, target))
            })
            .collect();

        let mut demoted = 0;
        for (key, from, to) in candidates {
            if self.demote(&key, from, to).await.success {
                demoted += 1;
            }
        }
        if demoted > 0 {
            info!(demoted, "idle demotion cycle completed");
        }
        demoted
    }

    // =========================================================================
    // Stats / Health / Lifecycle
    // =========================================================================

    /// Per-class counters, one defensive copy per registered adapter
    pub fn stats(&self) -> BTreeMap<StorageClass, StorageStats> {
        self.adapters
            .iter()
            .map(|(class, adapter)| (*class, adapter.stats()))
            .collect()
    }

    /// Probe every registered adapter
    pub async fn health_check(&self) -> BTreeMap<StorageClass, HealthReport> {
        let probes = self.adapters.iter().map(|(class, adapter)| async move {
            (*class, adapter.health_check().await)
        });
        join_all(probes).await.into_iter().collect()
    }

    /// Close every registered adapter; idempotent
    pub async fn close(&self) {
        for adapter in self.adapters.values() {
            adapter.close().await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metrics::noop_metrics;
    use crate::storage::stats::{OpKind, OpOutcome, StatsRecorder};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// In-memory adapter standing in for any tier, with a failure switch
    struct StubAdapter {
        class: StorageClass,
        name: &'static str,
        entries: DashMap<String, Value>,
        fail: AtomicBool,
        stats: StatsRecorder,
    }

    impl StubAdapter {
        fn new(class: StorageClass, name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                class,
                name,
                entries: DashMap::new(),
                fail: AtomicBool::new(false),
                stats: StatsRecorder::new(class, name, false, noop_metrics()),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::Relaxed);
        }

        fn failing(&self) -> bool {
            self.fail.load(Ordering::Relaxed)
        }

        fn metadata(&self) -> ResultMetadata {
            ResultMetadata::new(self.class, self.name)
        }
    }

    #[async_trait]
    impl StorageAdapter for StubAdapter {
        fn backend(&self) -> &'static str {
            self.name
        }

        fn storage_class(&self) -> StorageClass {
            self.class
        }

        async fn get(&self, key: &str) -> StorageResult<Value> {
            let started = Instant::now();
            if self.failing() {
                self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Error);
                return StorageResult::err("backend down", self.metadata());
            }
            match self.entries.get(key) {
                Some(value) => {
                    self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Hit);
                    StorageResult::ok(value.value().clone(), self.metadata())
                }
                None => {
                    self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Miss);
                    StorageResult::err("Key not found", self.metadata())
                }
            }
        }

        async fn put(&self, key: &str, value: &Value, _options: &StorageOptions) -> StorageResult<()> {
            let started = Instant::now();
            if self.failing() {
                self.stats.record(OpKind::Put, Some(key), started, OpOutcome::Error);
                return StorageResult::err("backend down", self.metadata());
            }
            self.entries.insert(key.to_string(), value.clone());
            self.stats.record(OpKind::Put, Some(key), started, OpOutcome::Success);
            StorageResult::ok_empty(self.metadata())
        }

        async fn delete(&self, key: &str) -> StorageResult<u64> {
            let started = Instant::now();
            if self.failing() {
                self.stats.record(OpKind::Delete, Some(key), started, OpOutcome::Error);
                return StorageResult::err("backend down", self.metadata());
            }
            let removed = if self.entries.remove(key).is_some() { 1 } else { 0 };
            self.stats.record(OpKind::Delete, Some(key), started, OpOutcome::Success);
            StorageResult::ok(removed, self.metadata())
        }

        async fn list(&self, options: &ListOptions) -> StorageResult<Vec<String>> {
            let started = Instant::now();
            let mut keys: Vec<String> = self
                .entries
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| {
                    options
                        .prefix
                        .as_deref()
                        .map(|p| k.starts_with(p))
                        .unwrap_or(true)
                })
                .collect();
            keys.sort();
            self.stats
                .record(OpKind::List, options.prefix.as_deref(), started, OpOutcome::Success);
            StorageResult::ok(keys, self.metadata())
        }

        fn stats(&self) -> StorageStats {
            self.stats.snapshot()
        }

        async fn health_check(&self) -> HealthReport {
            if self.failing() {
                HealthReport::unhealthy("backend down")
            } else {
                HealthReport::healthy()
            }
        }

        async fn close(&self) {}
    }

    struct TestTiers {
        hot: Arc<StubAdapter>,
        warm: Arc<StubAdapter>,
        cold: Arc<StubAdapter>,
        router: TierRouter,
    }

    fn tiers_with_config(config: RouterConfig) -> TestTiers {
        let hot = StubAdapter::new(StorageClass::HotCache, "hot-stub");
        let warm = StubAdapter::new(StorageClass::WarmCache, "warm-stub");
        let cold = StubAdapter::new(StorageClass::ColdStorage, "cold-stub");
        let router = TierRouter::builder()
            .with_config(config)
            .register(hot.clone())
            .register(warm.clone())
            .register(cold.clone())
            .build()
            .unwrap();
        TestTiers {
            hot,
            warm,
            cold,
            router,
        }
    }

    fn tiers() -> TestTiers {
        tiers_with_config(RouterConfig::default())
    }

    #[tokio::test]
    async fn test_put_and_get_on_requested_class() {
        let t = tiers();
        let value = json!({"x": 1});

        let put = t
            .router
            .put(StorageClass::HotCache, "k", &value, &StorageOptions::default())
            .await;
        assert!(put.success);
        let routing = put.metadata.routing.unwrap();
        assert_eq!(routing.routed_class, Some(StorageClass::HotCache));
        assert_eq!(routing.routed_adapter.as_deref(), Some("hot-stub"));
        assert!(routing.size.unwrap() > 0);

        let got = t.router.get(StorageClass::HotCache, "k").await;
        assert!(got.success);
        assert_eq!(got.data, Some(value));
        let routing = got.metadata.routing.unwrap();
        assert_eq!(routing.routed_class, Some(StorageClass::HotCache));
    }

    #[tokio::test]
    async fn test_read_resolves_down_the_chain() {
        let t = tiers();
        t.cold.entries.insert("cold_only".into(), json!(42));

        let got = t.router.get(StorageClass::HotCache, "cold_only").await;
        assert!(got.success);
        assert_eq!(got.data, Some(json!(42)));
        let routing = got.metadata.routing.unwrap();
        assert_eq!(routing.routed_class, Some(StorageClass::ColdStorage));
        assert_eq!(routing.routed_adapter.as_deref(), Some("cold-stub"));
        assert!(!routing.promoted);
    }

    #[tokio::test]
    async fn test_total_miss_reports_not_found() {
        let t = tiers();
        let got = t.router.get(StorageClass::HotCache, "missing").await;
        assert!(!got.success);
        assert_eq!(got.error.as_deref(), Some("Key not found"));
        assert!(got.metadata.routing.unwrap().adapter_errors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_tier_is_walked_past_and_recorded() {
        let t = tiers();
        t.hot.set_failing(true);
        t.warm.entries.insert("k".into(), json!("warm value"));

        let got = t.router.get(StorageClass::HotCache, "k").await;
        assert!(got.success);
        assert_eq!(got.data, Some(json!("warm value")));
        let routing = got.metadata.routing.unwrap();
        assert_eq!(routing.routed_class, Some(StorageClass::WarmCache));
        assert_eq!(routing.adapter_errors, vec!["hot-stub: backend down".to_string()]);
    }

    #[tokio::test]
    async fn test_promotion_after_threshold_hits() {
        let t = tiers();
        let mut events = t.router.subscribe();
        t.cold.entries.insert("popular".into(), json!({"v": 1}));

        // First two reads are served cold without promotion
        for _ in 0..2 {
            let got = t.router.get(StorageClass::HotCache, "popular").await;
            assert!(!got.metadata.routing.unwrap().promoted);
            assert!(!t.hot.entries.contains_key("popular"));
        }

        // Third read crosses the threshold
        let got = t.router.get(StorageClass::HotCache, "popular").await;
        let routing = got.metadata.routing.unwrap();
        assert!(routing.promoted);
        assert_eq!(routing.from_class, Some(StorageClass::ColdStorage));
        assert_eq!(routing.to_class, Some(StorageClass::HotCache));
        assert_eq!(
            t.hot.entries.get("popular").unwrap().value().clone(),
            json!({"v": 1})
        );

        // Promotion copies; cold keeps its value
        assert!(t.cold.entries.contains_key("popular"));

        // Next read is served hot
        let got = t.router.get(StorageClass::HotCache, "popular").await;
        assert_eq!(
            got.metadata.routing.unwrap().routed_class,
            Some(StorageClass::HotCache)
        );

        let mut saw_promote = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TierEvent::Promote { .. }) {
                saw_promote = true;
            }
        }
        assert!(saw_promote);
    }

    #[tokio::test]
    async fn test_explicit_promote_and_direction_check() {
        let t = tiers();
        t.cold.entries.insert("k".into(), json!(7));

        let promoted = t
            .router
            .promote("k", StorageClass::ColdStorage, StorageClass::WarmCache)
            .await;
        assert!(promoted.success);
        let routing = promoted.metadata.routing.unwrap();
        assert!(routing.promoted);
        assert_eq!(routing.from_class, Some(StorageClass::ColdStorage));
        assert!(t.warm.entries.contains_key("k"));

        let wrong_way = t
            .router
            .promote("k", StorageClass::WarmCache, StorageClass::ColdStorage)
            .await;
        assert!(!wrong_way.success);
    }

    #[tokio::test]
    async fn test_fallback_write_on_primary_failure() {
        let t = tiers();
        t.hot.set_failing(true);

        let put = t
            .router
            .put(
                StorageClass::HotCache,
                "k",
                &json!({"v": 1}),
                &StorageOptions::default(),
            )
            .await;
        assert!(put.success);
        let routing = put.metadata.routing.unwrap();
        assert!(routing.fallback_write);
        assert_eq!(routing.routed_class, Some(StorageClass::WarmCache));
        assert_eq!(
            routing.adapter_errors,
            vec!["hot-stub: backend down".to_string()]
        );
        assert!(t.warm.entries.contains_key("k"));
    }

    #[tokio::test]
    async fn test_write_fails_when_primary_and_fallback_fail() {
        let t = tiers();
        t.hot.set_failing(true);
        t.warm.set_failing(true);

        let put = t
            .router
            .put(
                StorageClass::HotCache,
                "k",
                &json!(1),
                &StorageOptions::default(),
            )
            .await;
        assert!(!put.success);
        let routing = put.metadata.routing.unwrap();
        assert_eq!(routing.adapter_errors.len(), 2);
        // Exactly one fallback hop: cold was never tried
        assert!(!t.cold.entries.contains_key("k"));
    }

    #[tokio::test]
    async fn test_dual_mode_write_succeeds_with_one_tier_up() {
        let t = tiers_with_config(RouterConfig {
            dual_write: true,
            ..Default::default()
        });

        let put = t
            .router
            .put(
                StorageClass::HotCache,
                "k",
                &json!(1),
                &StorageOptions::default(),
            )
            .await;
        assert!(put.success);
        let routing = put.metadata.routing.unwrap();
        assert!(routing.dual_mode);
        assert_eq!(routing.routed_adapter.as_deref(), Some("hot-stub+warm-stub"));
        assert!(t.hot.entries.contains_key("k"));
        assert!(t.warm.entries.contains_key("k"));

        // One tier down: still a success, with the failure recorded
        t.hot.set_failing(true);
        let put = t
            .router
            .put(
                StorageClass::HotCache,
                "k2",
                &json!(2),
                &StorageOptions::default(),
            )
            .await;
        assert!(put.success);
        let routing = put.metadata.routing.unwrap();
        assert!(routing.dual_mode);
        assert_eq!(routing.routed_adapter.as_deref(), Some("warm-stub"));
        assert_eq!(
            routing.adapter_errors,
            vec!["hot-stub: backend down".to_string()]
        );

        // Both tiers down: failure
        t.warm.set_failing(true);
        let put = t
            .router
            .put(
                StorageClass::HotCache,
                "k3",
                &json!(3),
                &StorageOptions::default(),
            )
            .await;
        assert!(!put.success);
        assert_eq!(put.metadata.routing.unwrap().adapter_errors.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_with_fallback() {
        let t = tiers();
        t.warm.entries.insert("k".into(), json!(1));
        t.hot.set_failing(true);

        let deleted = t.router.delete(StorageClass::HotCache, "k").await;
        assert!(deleted.success);
        let routing = deleted.metadata.routing.unwrap();
        assert!(routing.fallback_delete);
        assert_eq!(routing.routed_class, Some(StorageClass::WarmCache));
        assert!(!t.warm.entries.contains_key("k"));
    }

    #[tokio::test]
    async fn test_demote_moves_value_and_compresses() {
        let t = tiers();
        // Large repetitive payload so compression engages
        let value = json!({ "rows": vec!["repeated line of report text"; 200] });
        t.hot.entries.insert("idle_key".into(), value.clone());

        let demoted = t
            .router
            .demote("idle_key", StorageClass::HotCache, StorageClass::ColdStorage)
            .await;
        assert!(demoted.success);
        let routing = demoted.metadata.routing.unwrap();
        assert!(routing.demoted);
        assert_eq!(routing.from_class, Some(StorageClass::HotCache));
        assert_eq!(routing.to_class, Some(StorageClass::ColdStorage));
        let original = routing.original_size.unwrap();
        let compressed = routing.compressed_size.unwrap();
        assert!(compressed < original);

        // Evicted from the source tier, stored wrapped in the target
        assert!(!t.hot.entries.contains_key("idle_key"));
        let stored = t.cold.entries.get("idle_key").unwrap().value().clone();
        assert!(stored.get("__tierstore_compressed").is_some());

        // Reads through the router decode transparently
        let got = t.router.get(StorageClass::ColdStorage, "idle_key").await;
        assert!(got.success);
        assert_eq!(got.data, Some(value));
        let routing = got.metadata.routing.unwrap();
        assert_eq!(routing.original_size, Some(original));
        assert_eq!(routing.compressed_size, Some(compressed));
    }

    #[tokio::test]
    async fn test_small_payload_demotes_uncompressed() {
        let t = tiers();
        t.hot.entries.insert("small".into(), json!({"x": 1}));

        let demoted = t
            .router
            .demote("small", StorageClass::HotCache, StorageClass::WarmCache)
            .await;
        assert!(demoted.success);
        let routing = demoted.metadata.routing.unwrap();
        assert!(routing.original_size.is_none());
        assert_eq!(
            t.warm.entries.get("small").unwrap().value().clone(),
            json!({"x": 1})
        );
    }

    #[tokio::test]
    async fn test_idle_demotion_cycle() {
        let t = tiers_with_config(RouterConfig {
            demotion_idle_secs: 0, // everything is immediately idle
            ..Default::default()
        });

        t.router
            .put(
                StorageClass::HotCache,
                "report_a",
                &json!(1),
                &StorageOptions::default(),
            )
            .await;
        t.router
            .put(
                StorageClass::ColdStorage,
                "report_b",
                &json!(2),
                &StorageOptions::default(),
            )
            .await;

        let demoted = t.router.run_demotion_cycle().await;
        // Only the hot-tier key moves; cold-tier keys are never idle-demoted
        assert_eq!(demoted, 1);
        assert!(!t.hot.entries.contains_key("report_a"));
        assert!(t.warm.entries.contains_key("report_a"));
        assert!(t.cold.entries.contains_key("report_b"));
    }

    #[tokio::test]
    async fn test_get_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Payload {
            x: u32,
        }

        let t = tiers();
        t.router
            .put(
                StorageClass::HotCache,
                "typed",
                &json!({"x": 5}),
                &StorageOptions::default(),
            )
            .await;

        let got: StorageResult<Payload> =
            t.router.get_typed(StorageClass::HotCache, "typed").await;
        assert!(got.success);
        assert_eq!(got.data, Some(Payload { x: 5 }));

        // Shape mismatch surfaces as a failed result, not a panic
        t.router
            .put(
                StorageClass::HotCache,
                "mistyped",
                &json!({"x": "not a number"}),
                &StorageOptions::default(),
            )
            .await;
        let got: StorageResult<Payload> =
            t.router.get_typed(StorageClass::HotCache, "mistyped").await;
        assert!(!got.success);
        assert!(got.error.unwrap().contains("payload decode failed"));
    }

    #[tokio::test]
    async fn test_stats_and_health_aggregation() {
        let t = tiers();
        t.router
            .put(
                StorageClass::HotCache,
                "k",
                &json!(1),
                &StorageOptions::default(),
            )
            .await;
        t.router.get(StorageClass::HotCache, "k").await;

        let stats = t.router.stats();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[&StorageClass::HotCache].total_operations, 2);
        assert_eq!(stats[&StorageClass::HotCache].hits, 1);

        let health = t.router.health_check().await;
        assert!(health.values().all(|r| r.healthy));

        t.cold.set_failing(true);
        let health = t.router.health_check().await;
        assert!(!health[&StorageClass::ColdStorage].healthy);
        assert!(health[&StorageClass::HotCache].healthy);
    }

    #[tokio::test]
    async fn test_unregistered_class_is_an_error() {
        let hot = StubAdapter::new(StorageClass::HotCache, "hot-stub");
        let router = TierRouter::builder().register(hot).build().unwrap();

        let put = router
            .put(
                StorageClass::ColdStorage,
                "k",
                &json!(1),
                &StorageOptions::default(),
            )
            .await;
        assert!(!put.success);
        assert_matches!(put.error.as_deref(), Some(e) if e.contains("no adapter registered"));
    }

    #[tokio::test]
    async fn test_empty_router_is_rejected() {
        assert!(TierRouter::builder().build().is_err());
    }

    #[tokio::test]
    async fn test_list_targets_single_class() {
        let t = tiers();
        t.hot.entries.insert("analysis_AAPL".into(), json!(1));
        t.cold.entries.insert("analysis_MSFT".into(), json!(2));

        let listed = t
            .router
            .list(StorageClass::HotCache, &ListOptions::with_prefix("analysis_"))
            .await;
        assert_eq!(listed.data, Some(vec!["analysis_AAPL".to_string()]));
    }
}

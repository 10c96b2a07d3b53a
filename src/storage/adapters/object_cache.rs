//! Object-Cache Adapter (hot/warm tier)
//!
//! Forwards operations to a remote, low-latency keyed cache service behind a
//! narrow backend trait, translating the service's shape into the uniform
//! `StorageResult` envelope.
//!
//! Miss policy: this adapter treats "not found" as a successful call with
//! empty data (`success: true`, `data: None`). The relational and ephemeral
//! adapters report misses as `success: false`; callers branch on this
//! per-adapter contract.

use crate::error::{Error, Result};
use crate::storage::adapters::StorageAdapter;
use crate::storage::class::StorageClass;
use crate::storage::metrics::MetricsCollectorRef;
use crate::storage::result::{ListOptions, ResultMetadata, StorageOptions, StorageResult};
use crate::storage::stats::{HealthReport, OpKind, OpOutcome, StatsRecorder, StorageStats};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Throwaway key used by the live health probe
const HEALTH_PROBE_KEY: &str = "__tierstore_health_probe__";

// =============================================================================
// Backend Trait
// =============================================================================

/// Narrow contract the remote cache service must satisfy: point get/set/delete
/// by string key with TTL. Enumeration is deliberately absent.
#[async_trait]
pub trait ObjectCacheBackend: Send + Sync {
    /// Fetch a value; `None` when the key is absent
    async fn fetch(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value with the given TTL in seconds
    async fn store(&self, key: &str, value: &Value, ttl_seconds: u64) -> Result<()>;

    /// Remove a key; absence is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Shared backend handle
pub type ObjectCacheBackendRef = Arc<dyn ObjectCacheBackend>;

// =============================================================================
// HTTP Backend
// =============================================================================

/// Configuration for the HTTP cache backend
#[derive(Debug, Clone)]
pub struct HttpCacheConfig {
    /// Cache service endpoint
    pub endpoint: String,
    /// Logical namespace under the service
    pub namespace: String,
    /// Per-request timeout; a timeout is a counted error, not a silent drop
    pub request_timeout: Duration,
}

impl Default for HttpCacheConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://object-cache:8080".to_string(),
            namespace: "cache".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP implementation of the object-cache backend
///
/// Keys are URL-encoded into the path; the service maps absent keys to 404.
pub struct HttpCacheBackend {
    client: reqwest::Client,
    config: HttpCacheConfig,
}

impl HttpCacheBackend {
    /// Create a backend with its own HTTP client
    pub fn new(config: HttpCacheConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn key_url(&self, key: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.namespace,
            urlencoding::encode(key)
        )
    }

    async fn unexpected_status(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Error::CacheProtocol { status, message }
    }
}

#[async_trait]
impl ObjectCacheBackend for HttpCacheBackend {
    async fn fetch(&self, key: &str) -> Result<Option<Value>> {
        let response = self.client.get(self.key_url(key)).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(Self::unexpected_status(response).await),
        }
    }

    async fn store(&self, key: &str, value: &Value, ttl_seconds: u64) -> Result<()> {
        let response = self
            .client
            .put(self.key_url(key))
            .query(&[("ttl", ttl_seconds)])
            .json(value)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unexpected_status(response).await)
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let response = self.client.delete(self.key_url(key)).send().await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(Self::unexpected_status(response).await),
        }
    }
}

// =============================================================================
// Adapter Configuration
// =============================================================================

/// Configuration for the object-cache adapter
#[derive(Debug, Clone)]
pub struct ObjectCacheConfig {
    /// Class this adapter serves; must be `hot_cache` or `warm_cache`
    pub class: StorageClass,
    /// TTL applied when a write carries none
    pub default_ttl_secs: u64,
}

impl Default for ObjectCacheConfig {
    fn default() -> Self {
        Self {
            class: StorageClass::HotCache,
            default_ttl_secs: 300,
        }
    }
}

// =============================================================================
// Object-Cache Adapter
// =============================================================================

/// Adapter over a remote keyed cache service
pub struct ObjectCacheAdapter {
    backend: ObjectCacheBackendRef,
    config: ObjectCacheConfig,
    stats: StatsRecorder,
}

impl ObjectCacheAdapter {
    /// Backend identifier
    pub const BACKEND: &'static str = "object-cache";

    /// Create an adapter over the given backend
    pub fn new(
        backend: ObjectCacheBackendRef,
        config: ObjectCacheConfig,
        metrics: MetricsCollectorRef,
    ) -> Result<Self> {
        if !matches!(
            config.class,
            StorageClass::HotCache | StorageClass::WarmCache
        ) {
            return Err(Error::Configuration(format!(
                "object-cache adapter serves hot_cache or warm_cache, not {}",
                config.class
            )));
        }
        debug!(class = %config.class, default_ttl = config.default_ttl_secs, "object-cache adapter initialized");
        Ok(Self {
            stats: StatsRecorder::new(config.class, Self::BACKEND, true, metrics),
            backend,
            config,
        })
    }

    fn metadata(&self) -> ResultMetadata {
        ResultMetadata::new(self.config.class, Self::BACKEND)
    }
}

#[async_trait]
impl StorageAdapter for ObjectCacheAdapter {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn storage_class(&self) -> StorageClass {
        self.config.class
    }

    async fn get(&self, key: &str) -> StorageResult<Value> {
        let started = Instant::now();
        match self.backend.fetch(key).await {
            Ok(Some(value)) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Hit);
                StorageResult::ok(value, self.metadata()).with_latency(latency)
            }
            // A "not found" from the cache service is a successful call with
            // empty data on this adapter.
            Ok(None) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Miss);
                StorageResult::ok_empty(self.metadata()).with_latency(latency)
            }
            Err(e) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "object-cache get failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    async fn put(&self, key: &str, value: &Value, options: &StorageOptions) -> StorageResult<()> {
        let started = Instant::now();
        let ttl = options.ttl.unwrap_or(self.config.default_ttl_secs);
        match self.backend.store(key, value, ttl).await {
            Ok(()) => {
                let latency = self
                    .stats
                    .record(OpKind::Put, Some(key), started, OpOutcome::Success);
                StorageResult::ok_empty(self.metadata().with_ttl(Some(ttl))).with_latency(latency)
            }
            Err(e) => {
                let latency = self.stats.record(OpKind::Put, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "object-cache put failed");
                StorageResult::err(e.to_string(), self.metadata().with_ttl(Some(ttl)))
                    .with_latency(latency)
            }
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        let started = Instant::now();
        match self.backend.remove(key).await {
            Ok(()) => {
                let latency = self
                    .stats
                    .record(OpKind::Delete, Some(key), started, OpOutcome::Success);
                StorageResult::ok_empty(self.metadata()).with_latency(latency)
            }
            Err(e) => {
                let latency = self
                    .stats
                    .record(OpKind::Delete, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "object-cache delete failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    /// The cache service has no enumeration primitive, so this returns an
    /// explicit empty key list; it never claims completeness.
    async fn list(&self, options: &ListOptions) -> StorageResult<Vec<String>> {
        let started = Instant::now();
        debug!(
            prefix = options.prefix.as_deref().unwrap_or(""),
            "object-cache backend has no enumeration primitive; returning empty key list"
        );
        let latency = self.stats.record(
            OpKind::List,
            options.prefix.as_deref(),
            started,
            OpOutcome::Success,
        );
        StorageResult::ok(Vec::new(), self.metadata()).with_latency(latency)
    }

    fn stats(&self) -> StorageStats {
        self.stats.snapshot()
    }

    async fn health_check(&self) -> HealthReport {
        let probe = json!({"probe": true});
        if let Err(e) = self.backend.store(HEALTH_PROBE_KEY, &probe, 30).await {
            return HealthReport::unhealthy(format!("probe write failed: {}", e));
        }
        if let Err(e) = self.backend.remove(HEALTH_PROBE_KEY).await {
            return HealthReport::unhealthy(format!("probe delete failed: {}", e));
        }
        HealthReport::healthy()
    }

    /// The remote connection is owned by the hosting runtime; nothing local
    /// to release.
    async fn close(&self) {}
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metrics::noop_metrics;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory stand-in for the remote cache service
    #[derive(Default)]
    struct MockCacheBackend {
        entries: DashMap<String, Value>,
        fail: AtomicBool,
    }

    impl MockCacheBackend {
        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::Relaxed);
        }

        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                Err(Error::BackendUnavailable {
                    backend: "object-cache".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ObjectCacheBackend for MockCacheBackend {
        async fn fetch(&self, key: &str) -> Result<Option<Value>> {
            self.check()?;
            Ok(self.entries.get(key).map(|v| v.value().clone()))
        }

        async fn store(&self, key: &str, value: &Value, _ttl_seconds: u64) -> Result<()> {
            self.check()?;
            self.entries.insert(key.to_string(), value.clone());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.entries.remove(key);
            Ok(())
        }
    }

    fn adapter() -> (Arc<MockCacheBackend>, ObjectCacheAdapter) {
        let backend = Arc::new(MockCacheBackend::default());
        let adapter = ObjectCacheAdapter::new(
            backend.clone(),
            ObjectCacheConfig::default(),
            noop_metrics(),
        )
        .unwrap();
        (backend, adapter)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_, adapter) = adapter();
        let value = json!({"x": 1});

        let put = adapter
            .put("analysis_AAPL", &value, &StorageOptions::with_ttl(3600))
            .await;
        assert!(put.success);
        assert_eq!(put.metadata.ttl, Some(3600));

        let got = adapter.get("analysis_AAPL").await;
        assert!(got.success);
        assert_eq!(got.data, Some(value));
        assert_eq!(got.metadata.backend, "object-cache");
        assert!(got.metadata.routing.is_none());
    }

    #[tokio::test]
    async fn test_miss_is_successful_empty_call() {
        let (_, adapter) = adapter();
        let got = adapter.get("never_written").await;
        assert!(got.success);
        assert!(got.data.is_none());
        assert!(got.error.is_none());
        assert_eq!(adapter.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_default_ttl_applied() {
        let (_, adapter) = adapter();
        let put = adapter
            .put("k", &json!(1), &StorageOptions::default())
            .await;
        assert_eq!(put.metadata.ttl, Some(300));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, adapter) = adapter();
        adapter
            .put("k", &json!(1), &StorageOptions::default())
            .await;
        assert!(adapter.delete("k").await.success);
        assert!(adapter.delete("k").await.success);
        assert!(adapter.delete("never_existed").await.success);
    }

    #[tokio::test]
    async fn test_transport_failure_counts_as_error() {
        let (backend, adapter) = adapter();
        backend.set_failing(true);

        let got = adapter.get("k").await;
        assert!(!got.success);
        assert!(got.error.is_some());

        let put = adapter.put("k", &json!(1), &StorageOptions::default()).await;
        assert!(!put.success);

        let stats = adapter.stats();
        assert_eq!(stats.total_operations, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.misses, 0);
        assert!(stats.last_access.is_some());
    }

    #[tokio::test]
    async fn test_list_is_explicit_empty_stub() {
        let (_, adapter) = adapter();
        adapter
            .put("analysis_AAPL", &json!(1), &StorageOptions::default())
            .await;
        let listed = adapter
            .list(&ListOptions::with_prefix("analysis_"))
            .await;
        assert!(listed.success);
        assert_eq!(listed.data, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_health_probe_round_trip() {
        let (backend, adapter) = adapter();
        assert!(adapter.health_check().await.healthy);
        // Probe key does not linger
        assert!(backend.entries.get(HEALTH_PROBE_KEY).is_none());

        backend.set_failing(true);
        let report = adapter.health_check().await;
        assert!(!report.healthy);
        assert!(report.issues[0].contains("probe write failed"));
    }

    #[tokio::test]
    async fn test_rejects_cold_class() {
        let backend = Arc::new(MockCacheBackend::default());
        let result = ObjectCacheAdapter::new(
            backend,
            ObjectCacheConfig {
                class: StorageClass::ColdStorage,
                ..Default::default()
            },
            noop_metrics(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_http_backend_url_encoding() {
        let backend = HttpCacheBackend::new(HttpCacheConfig {
            endpoint: "http://cache:8080/".into(),
            namespace: "cache".into(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(
            backend.key_url("analysis/AAPL 2024"),
            "http://cache:8080/v1/cache/analysis%2FAAPL%202024"
        );
    }
}

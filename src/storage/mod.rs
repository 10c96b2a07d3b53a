//! Tiered Storage Abstraction Layer
//!
//! A uniform interface over heterogeneous backing stores, each exposed
//! through the same contract, instrumented with latency/hit-rate statistics,
//! and capable of health-checking and explicit promotion/demotion between
//! storage classes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Tier Router                                   │
//! │   read: hot -> warm -> cold -> ephemeral     write: single fallback hop  │
//! │   promotion on repeated hits   idle demotion   dual-mode writes          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────────────┐  │
//! │  │   Object-Cache   │  │    Relational    │  │       Ephemeral        │  │
//! │  │  (remote, HTTP)  │  │  (SQLite table)  │  │  (DashMap, TTL sweep)  │  │
//! │  │  hot/warm tier   │  │    cold tier     │  │     last resort        │  │
//! │  └──────────────────┘  └──────────────────┘  └────────────────────────┘  │
//! │         │                      │                         │               │
//! │         └──────────────────────┼─────────────────────────┘               │
//! │                                │                                         │
//! │                  ┌─────────────┴─────────────┐                           │
//! │                  │   Stats / Health / Metrics │                          │
//! │                  │  (per-adapter recorders)   │                          │
//! │                  └───────────────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tierstore::storage::{
//!     EphemeralAdapter, EphemeralConfig, RelationalAdapter, RelationalConfig,
//!     StorageClass, StorageOptions, TierRouter,
//! };
//! use tierstore::storage::metrics::noop_metrics;
//! use std::sync::Arc;
//!
//! let cold = RelationalAdapter::new(conn, RelationalConfig::default(), noop_metrics())?;
//! let local = EphemeralAdapter::new(EphemeralConfig::default(), noop_metrics());
//!
//! let router = TierRouter::builder()
//!     .register(Arc::new(cold))
//!     .register(Arc::new(local))
//!     .build()?;
//!
//! router
//!     .put(StorageClass::ColdStorage, "analysis_AAPL_2024-01-01",
//!          &serde_json::json!({"x": 1}), &StorageOptions::with_ttl(3600))
//!     .await;
//! let result = router.get(StorageClass::ColdStorage, "analysis_AAPL_2024-01-01").await;
//! ```

pub mod adapters;
pub mod class;
pub mod compress;
pub mod events;
pub mod keyspace;
pub mod metrics;
pub mod result;
pub mod router;
pub mod stats;

// Re-export main types
pub use adapters::{
    EphemeralAdapter, EphemeralConfig, HttpCacheBackend, HttpCacheConfig, ObjectCacheAdapter,
    ObjectCacheBackend, ObjectCacheBackendRef, ObjectCacheConfig, RelationalAdapter,
    RelationalConfig, StorageAdapter, StorageAdapterRef,
};
pub use class::StorageClass;
pub use compress::{CompressionAlgorithm, CompressionConfig, PayloadCodec};
pub use events::TierEvent;
pub use keyspace::keyspace;
pub use metrics::{MetricsCollector, MetricsCollectorRef, NoopMetrics, PrometheusMetrics};
pub use result::{ListOptions, ResultMetadata, RoutingInfo, StorageOptions, StorageResult};
pub use router::{RouterConfig, TierRouter, TierRouterBuilder};
pub use stats::{HealthReport, StorageStats};

//! tierstore - Tiered Storage Abstraction Layer
//!
//! A uniform contract over three backing stores (a remote object-cache
//! service for the hot/warm tier, a relational cold-storage table, and a
//! process-local ephemeral cache) plus a tier router that mediates
//! promotion, demotion, fallback, and dual-mode writes between them.
//!
//! # Modules
//!
//! - [`storage`]: storage classes, the adapter contract, the three adapters,
//!   stats/health, metrics plumbing, and the tier router
//! - [`error`]: error types used at backend boundaries and constructors

pub mod error;
pub mod storage;

// Re-export commonly used types
pub use error::{Error, Result};

pub use storage::{
    EphemeralAdapter, EphemeralConfig, HealthReport, HttpCacheBackend, HttpCacheConfig,
    ListOptions, MetricsCollector, NoopMetrics, ObjectCacheAdapter, ObjectCacheBackend,
    ObjectCacheConfig, PrometheusMetrics, RelationalAdapter, RelationalConfig, ResultMetadata,
    RouterConfig, RoutingInfo, StorageAdapter, StorageAdapterRef, StorageClass, StorageOptions,
    StorageResult, StorageStats, TierEvent, TierRouter, TierRouterBuilder,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

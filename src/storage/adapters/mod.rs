//! Storage Backend Adapters
//!
//! One implementation of the [`StorageAdapter`] contract per backing store.
//! Adapters never throw across this interface: every failure mode is encoded
//! in the returned `StorageResult`, and adapters never retry internally;
//! cross-tier fallback belongs to the router.

mod ephemeral;
mod object_cache;
mod relational;

pub use ephemeral::{EphemeralAdapter, EphemeralConfig};
pub use object_cache::{
    HttpCacheBackend, HttpCacheConfig, ObjectCacheAdapter, ObjectCacheBackend,
    ObjectCacheBackendRef, ObjectCacheConfig,
};
pub use relational::{RelationalAdapter, RelationalConfig};

use crate::storage::class::StorageClass;
use crate::storage::result::{ListOptions, StorageOptions, StorageResult};
use crate::storage::stats::{HealthReport, StorageStats};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// StorageAdapter Trait (Port)
// =============================================================================

/// Uniform contract over heterogeneous backing stores
///
/// Payloads cross the boundary as JSON values; an adapter is bound to one
/// storage class for its whole lifetime and owns its own statistics.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend identifier (stable, used in result metadata and logs)
    fn backend(&self) -> &'static str;

    /// Storage class this adapter serves
    fn storage_class(&self) -> StorageClass;

    /// Read a value by key
    ///
    /// Miss semantics are adapter-specific and part of the contract: see the
    /// implementations.
    async fn get(&self, key: &str) -> StorageResult<Value>;

    /// Write a value, honoring TTL and metadata hints
    async fn put(&self, key: &str, value: &Value, options: &StorageOptions) -> StorageResult<()>;

    /// Delete by key; absence of the key is not an error
    ///
    /// `data` carries the affected entry/row count where the backend reports
    /// one.
    async fn delete(&self, key: &str) -> StorageResult<u64>;

    /// Enumerate keys matching the options
    async fn list(&self, options: &ListOptions) -> StorageResult<Vec<String>>;

    /// Defensive copy of this adapter's counters
    fn stats(&self) -> StorageStats;

    /// Live backend probe
    async fn health_check(&self) -> HealthReport;

    /// Release local resources (timers); idempotent
    async fn close(&self);
}

/// Shared adapter handle
pub type StorageAdapterRef = Arc<dyn StorageAdapter>;

//! Relational Adapter (cold tier)
//!
//! Persists arbitrary JSON-serializable values keyed by string in a single
//! SQLite table `(key, value, metadata, created_at, updated_at)`. Value and
//! metadata are JSON-encoded text, re-parsed on every read. TTL here is
//! advisory metadata only; there is no background reaper.
//!
//! Miss policy: a miss is `success: false` with error `"Key not found"`;
//! callers must check `success` before reading `data`. This differs from the
//! object-cache adapter on purpose.

use crate::error::{Error, Result};
use crate::storage::adapters::StorageAdapter;
use crate::storage::class::StorageClass;
use crate::storage::metrics::MetricsCollectorRef;
use crate::storage::result::{ListOptions, ResultMetadata, StorageOptions, StorageResult};
use crate::storage::stats::{HealthReport, OpKind, OpOutcome, StatsRecorder, StorageStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Fixed failure message for the disabled state
const NOT_ENABLED: &str = "relational storage not enabled";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the relational adapter
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    /// Table backing this deployment; must be a plain SQL identifier
    pub table: String,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            table: "storage_entries".to_string(),
        }
    }
}

/// Validate a table name as a plain identifier (it is interpolated into SQL
/// text; identifiers cannot be bound as parameters)
fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "invalid table name: {:?}",
            name
        )))
    }
}

// =============================================================================
// Record Metadata
// =============================================================================

/// Metadata persisted alongside each row, JSON-encoded into the `metadata`
/// column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordMetadata {
    timestamp: DateTime<Utc>,
    storage_class: StorageClass,
    backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

// =============================================================================
// Relational Adapter
// =============================================================================

/// Adapter over one SQLite table
///
/// Constructed with a live connection via [`RelationalAdapter::new`], or
/// without one via [`RelationalAdapter::disabled`]. In the disabled state
/// every operation fails fast with a fixed message and no query is attempted,
/// while `total_operations` keeps counting so the stats stay honest.
pub struct RelationalAdapter {
    conn: Option<Arc<Mutex<Connection>>>,
    table: String,
    stats: StatsRecorder,
}

impl RelationalAdapter {
    /// Backend identifier
    pub const BACKEND: &'static str = "sqlite";

    /// Create an enabled adapter, bootstrapping the table if needed
    pub fn new(
        conn: Connection,
        config: RelationalConfig,
        metrics: MetricsCollectorRef,
    ) -> Result<Self> {
        validate_table_name(&config.table)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    metadata TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                config.table
            ),
            [],
        )?;
        debug!(table = %config.table, "relational adapter initialized");
        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            table: config.table,
            stats: StatsRecorder::new(StorageClass::ColdStorage, Self::BACKEND, false, metrics),
        })
    }

    /// Create a disabled adapter (no backend handle)
    pub fn disabled(config: RelationalConfig, metrics: MetricsCollectorRef) -> Self {
        warn!(table = %config.table, "relational adapter constructed without a database handle");
        Self {
            conn: None,
            table: config.table,
            stats: StatsRecorder::new(StorageClass::ColdStorage, Self::BACKEND, false, metrics),
        }
    }

    fn metadata(&self) -> ResultMetadata {
        ResultMetadata::new(StorageClass::ColdStorage, Self::BACKEND)
    }

    fn disabled_result<T>(&self, op: OpKind, key: Option<&str>, started: Instant) -> StorageResult<T> {
        let latency = self.stats.record(op, key, started, OpOutcome::Disabled);
        StorageResult::err(NOT_ENABLED, self.metadata()).with_latency(latency)
    }

    fn record_metadata(&self, options: &StorageOptions) -> RecordMetadata {
        RecordMetadata {
            timestamp: Utc::now(),
            storage_class: StorageClass::ColdStorage,
            backend: Self::BACKEND.to_string(),
            ttl: options.ttl,
            checksum: options.checksum.clone(),
            attributes: options.metadata.clone(),
        }
    }

    fn select_value(&self, conn: &Arc<Mutex<Connection>>, key: &str) -> Result<Option<Value>> {
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT value FROM {} WHERE key = ?1", self.table))?;
        match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert(
        &self,
        conn: &Arc<Mutex<Connection>>,
        key: &str,
        value: &Value,
        options: &StorageOptions,
    ) -> Result<()> {
        let value_text = serde_json::to_string(value)?;
        let metadata_text = serde_json::to_string(&self.record_metadata(options))?;
        let now = Utc::now().to_rfc3339();

        let conn = conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (key, value, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     metadata = excluded.metadata,
                     updated_at = excluded.updated_at",
                self.table
            ),
            params![key, value_text, metadata_text, now],
        )?;
        Ok(())
    }

    /// Escape LIKE wildcards so a literal prefix matches literally
    fn like_pattern(prefix: Option<&str>) -> String {
        match prefix {
            Some(prefix) => {
                let escaped = prefix
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!("{}%", escaped)
            }
            None => "%".to_string(),
        }
    }

    fn select_keys(
        &self,
        conn: &Arc<Mutex<Connection>>,
        options: &ListOptions,
    ) -> Result<Vec<String>> {
        let pattern = Self::like_pattern(options.prefix.as_deref());
        let limit = options.limit.map(|l| l as i64).unwrap_or(-1);

        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT key FROM {} WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key LIMIT ?2",
            self.table
        ))?;
        let rows = stmt.query_map(params![pattern, limit], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    fn count_rows(&self, conn: &Arc<Mutex<Connection>>) -> Result<u64> {
        let conn = conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl StorageAdapter for RelationalAdapter {
    fn backend(&self) -> &'static str {
        Self::BACKEND
    }

    fn storage_class(&self) -> StorageClass {
        StorageClass::ColdStorage
    }

    async fn get(&self, key: &str) -> StorageResult<Value> {
        let started = Instant::now();
        let Some(conn) = &self.conn else {
            return self.disabled_result(OpKind::Get, Some(key), started);
        };

        match self.select_value(conn, key) {
            Ok(Some(value)) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Hit);
                StorageResult::ok(value, self.metadata()).with_latency(latency)
            }
            Ok(None) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Miss);
                StorageResult::err("Key not found", self.metadata()).with_latency(latency)
            }
            Err(e) => {
                let latency = self.stats.record(OpKind::Get, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "relational get failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    async fn put(&self, key: &str, value: &Value, options: &StorageOptions) -> StorageResult<()> {
        let started = Instant::now();
        let Some(conn) = &self.conn else {
            return self.disabled_result(OpKind::Put, Some(key), started);
        };

        match self.upsert(conn, key, value, options) {
            Ok(()) => {
                let latency = self
                    .stats
                    .record(OpKind::Put, Some(key), started, OpOutcome::Success);
                StorageResult::ok_empty(self.metadata().with_ttl(options.ttl)).with_latency(latency)
            }
            Err(e) => {
                let latency = self.stats.record(OpKind::Put, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "relational put failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        let started = Instant::now();
        let Some(conn) = &self.conn else {
            return self.disabled_result(OpKind::Delete, Some(key), started);
        };

        let deleted = {
            let conn = conn.lock();
            conn.execute(
                &format!("DELETE FROM {} WHERE key = ?1", self.table),
                params![key],
            )
        };
        match deleted {
            Ok(rows) => {
                let latency = self
                    .stats
                    .record(OpKind::Delete, Some(key), started, OpOutcome::Success);
                StorageResult::ok(rows as u64, self.metadata()).with_latency(latency)
            }
            Err(e) => {
                let latency = self
                    .stats
                    .record(OpKind::Delete, Some(key), started, OpOutcome::Error);
                warn!(key, error = %e, "relational delete failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    async fn list(&self, options: &ListOptions) -> StorageResult<Vec<String>> {
        let started = Instant::now();
        let Some(conn) = &self.conn else {
            return self.disabled_result(OpKind::List, options.prefix.as_deref(), started);
        };

        match self.select_keys(conn, options) {
            Ok(keys) => {
                let latency = self.stats.record(
                    OpKind::List,
                    options.prefix.as_deref(),
                    started,
                    OpOutcome::Success,
                );
                StorageResult::ok(keys, self.metadata()).with_latency(latency)
            }
            Err(e) => {
                let latency = self.stats.record(
                    OpKind::List,
                    options.prefix.as_deref(),
                    started,
                    OpOutcome::Error,
                );
                warn!(error = %e, "relational list failed");
                StorageResult::err(e.to_string(), self.metadata()).with_latency(latency)
            }
        }
    }

    fn stats(&self) -> StorageStats {
        self.stats.snapshot()
    }

    async fn health_check(&self) -> HealthReport {
        let Some(conn) = &self.conn else {
            return HealthReport::unhealthy(NOT_ENABLED);
        };

        match self.count_rows(conn) {
            Ok(count) => {
                self.stats.set_storage_used(count);
                HealthReport::healthy()
            }
            Err(e) => HealthReport::unhealthy(format!("probe query failed: {}", e)),
        }
    }

    /// The connection is owned by the hosting runtime and dropped with the
    /// adapter; nothing local to release.
    async fn close(&self) {}
}

// =============================================================================
// Tests
// =============================================================================

//! Storage Result and Options Types
//!
//! Shared value types used by every adapter: the uniform response envelope,
//! write-time options, and list options. Routing-extension metadata is owned
//! by the router layer; bare adapters populate only timestamp, storage class,
//! backend name and resolved TTL.

use crate::storage::class::StorageClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Write Options
// =============================================================================

/// Write-time hints attached to a `put`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Seconds until expiry; absence means the backend default
    pub ttl: Option<u64>,
    /// Opaque key-value bag attached to the record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Integrity tag, passed through unverified
    pub checksum: Option<String>,
}

impl StorageOptions {
    /// Options with only a TTL set
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }
}

/// Options for key enumeration
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only return keys starting with this prefix
    pub prefix: Option<String>,
    /// Maximum number of keys to return
    pub limit: Option<usize>,
}

impl ListOptions {
    /// List options filtering by prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            limit: None,
        }
    }
}

// =============================================================================
// Result Metadata
// =============================================================================

/// Metadata attached to every [`StorageResult`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// When the operation completed
    pub timestamp: DateTime<Utc>,
    /// Storage class the serving adapter is bound to
    pub storage_class: StorageClass,
    /// Backend identifier of the serving adapter
    pub backend: String,
    /// Resolved TTL in seconds (writes only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Routing-extension fields, populated only by the tier router
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingInfo>,
}

impl ResultMetadata {
    /// Metadata as a bare adapter produces it
    pub fn new(storage_class: StorageClass, backend: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            storage_class,
            backend: backend.into(),
            ttl: None,
            routing: None,
        }
    }

    /// Attach a resolved TTL
    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get the routing info, creating a default one if absent
    pub fn routing_mut(&mut self) -> &mut RoutingInfo {
        self.routing.get_or_insert_with(RoutingInfo::default)
    }
}

/// Cross-tier routing metadata
///
/// Populated only by the router layer, never by a bare adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingInfo {
    /// Class that actually served the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_class: Option<StorageClass>,
    /// Backend name(s) that served the request; dual-mode writes join the
    /// succeeding backends with `+`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_adapter: Option<String>,
    /// Value was copied to a warmer tier as part of this call
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub promoted: bool,
    /// Value was rewritten to a colder tier as part of this call
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub demoted: bool,
    /// Source class of a promotion/demotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_class: Option<StorageClass>,
    /// Target class of a promotion/demotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_class: Option<StorageClass>,
    /// Write went to two tiers for redundancy
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dual_mode: bool,
    /// Primary write failed and the fallback tier served the write
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_write: bool,
    /// Primary delete failed and the fallback tier served the delete
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_delete: bool,
    /// Errors from adapters that failed along the way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adapter_errors: Vec<String>,
    /// Serialized payload size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Payload size before compression (demotion with compression only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    /// Payload size after compression (demotion with compression only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
}

// =============================================================================
// Storage Result
// =============================================================================

/// Uniform response envelope for every storage operation
///
/// Adapters never return `Err` across the public interface; every failure
/// mode is encoded here. Note the miss-policy asymmetry: the object-cache
/// adapter reports a miss as `success: true` with empty `data`, while the
/// relational and ephemeral adapters report `success: false` with a
/// "Key not found" / "Key expired" error. Callers branch on this contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageResult<T> {
    /// Operation completed without error
    pub success: bool,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Measured wall-clock duration of the operation in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Operation metadata
    pub metadata: ResultMetadata,
}

impl<T> StorageResult<T> {
    /// Successful result carrying a payload
    pub fn ok(data: T, metadata: ResultMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms: None,
            metadata,
        }
    }

    /// Successful result without a payload (object-cache miss, void writes)
    pub fn ok_empty(metadata: ResultMetadata) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            latency_ms: None,
            metadata,
        }
    }

    /// Failed result
    pub fn err(error: impl Into<String>, metadata: ResultMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            latency_ms: None,
            metadata,
        }
    }

    /// Attach the measured latency
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// True when the result represents a miss rather than a hard failure
    pub fn is_miss(&self) -> bool {
        match (&self.error, self.success, &self.data) {
            (Some(e), false, _) => e == "Key not found" || e == "Key expired",
            (None, true, None) => true,
            _ => false,
        }
    }

    /// Map the payload type, preserving the envelope
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> StorageResult<U> {
        StorageResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            latency_ms: self.latency_ms,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ResultMetadata {
        ResultMetadata::new(StorageClass::ColdStorage, "sqlite")
    }

    #[test]
    fn test_result_constructors() {
        let ok: StorageResult<u64> = StorageResult::ok(3, meta()).with_latency(1.25);
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));
        assert_eq!(ok.latency_ms, Some(1.25));
        assert!(ok.error.is_none());

        let err: StorageResult<u64> = StorageResult::err("Key not found", meta());
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.error.as_deref(), Some("Key not found"));
    }

    #[test]
    fn test_miss_detection() {
        // Relational-style miss: success false + "Key not found"
        let miss: StorageResult<()> = StorageResult::err("Key not found", meta());
        assert!(miss.is_miss());

        // Ephemeral-style miss: success false + "Key expired"
        let expired: StorageResult<()> = StorageResult::err("Key expired", meta());
        assert!(expired.is_miss());

        // Object-cache-style miss: success true, no data
        let empty: StorageResult<()> = StorageResult::ok_empty(meta());
        assert!(empty.is_miss());

        // Transport failure is not a miss
        let failed: StorageResult<()> = StorageResult::err("connection refused", meta());
        assert!(!failed.is_miss());
    }

    #[test]
    fn test_adapter_metadata_has_no_routing() {
        let result: StorageResult<()> = StorageResult::ok_empty(meta());
        assert!(result.metadata.routing.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["metadata"].get("routing").is_none());
    }

    #[test]
    fn test_routing_info_serialization_is_sparse() {
        let mut m = meta();
        let routing = m.routing_mut();
        routing.fallback_write = true;
        routing.adapter_errors.push("primary down".into());

        let json = serde_json::to_value(&m).unwrap();
        let routing = &json["routing"];
        assert_eq!(routing["fallback_write"], true);
        // Unset flags and empty fields are omitted entirely
        assert!(routing.get("promoted").is_none());
        assert!(routing.get("dual_mode").is_none());
        assert!(routing.get("size").is_none());
    }

    #[test]
    fn test_map_data() {
        let ok: StorageResult<u64> = StorageResult::ok(2, meta());
        let mapped = ok.map_data(|n| n.to_string());
        assert_eq!(mapped.data.as_deref(), Some("2"));
        assert!(mapped.success);
    }
}

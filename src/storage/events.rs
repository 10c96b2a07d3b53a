//! Router Events
//!
//! Events emitted by the tier router for monitoring and observability.
//! Delivered over a tokio broadcast channel; lagging or absent subscribers
//! never block routing.

use crate::storage::class::StorageClass;
use serde::{Deserialize, Serialize};

/// Events emitted by the tier router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TierEvent {
    /// A read was served
    Hit {
        key: String,
        class: StorageClass,
        promoted: bool,
    },

    /// A read missed every tier in the chain
    Miss { key: String },

    /// A value was written
    Put {
        key: String,
        class: StorageClass,
        size: u64,
        fallback: bool,
    },

    /// A value was deleted
    Delete { key: String, class: StorageClass },

    /// A value was copied to a warmer tier
    Promote {
        key: String,
        from_class: StorageClass,
        to_class: StorageClass,
    },

    /// A value was rewritten to a colder tier
    Demote {
        key: String,
        from_class: StorageClass,
        to_class: StorageClass,
        original_size: Option<u64>,
        compressed_size: Option<u64>,
    },

    /// A primary write failed and the fallback tier served it
    FallbackWrite {
        key: String,
        from_class: StorageClass,
        to_class: StorageClass,
        error: String,
    },
}

impl TierEvent {
    /// Get the key associated with this event
    pub fn key(&self) -> &str {
        match self {
            TierEvent::Hit { key, .. }
            | TierEvent::Miss { key }
            | TierEvent::Put { key, .. }
            | TierEvent::Delete { key, .. }
            | TierEvent::Promote { key, .. }
            | TierEvent::Demote { key, .. }
            | TierEvent::FallbackWrite { key, .. } => key,
        }
    }

    /// Whether this event represents a degraded path
    pub fn is_degraded(&self) -> bool {
        matches!(self, TierEvent::FallbackWrite { .. })
    }
}

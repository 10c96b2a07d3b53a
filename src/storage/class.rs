//! Storage Class Definitions
//!
//! Logical latency/durability tiers, independent of which concrete backend
//! serves them. An adapter declares the class it serves; the router maps
//! classes onto adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Storage Class
// =============================================================================

/// Logical storage tier for a value
///
/// Ordering is warmest-first: `hot_cache` < `warm_cache` < `cold_storage` <
/// `ephemeral`. The ephemeral class sits at the end of the chain as the
/// last-resort, non-durable fallback when durable tiers are unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    /// Low-latency remote object cache
    #[default]
    HotCache,
    /// Remote object cache with longer TTLs
    WarmCache,
    /// Relational cold storage (durable)
    ColdStorage,
    /// Process-local in-memory cache (non-durable)
    Ephemeral,
}

impl StorageClass {
    /// Get class priority (lower is warmer)
    pub fn priority(&self) -> u8 {
        match self {
            StorageClass::HotCache => 0,
            StorageClass::WarmCache => 1,
            StorageClass::ColdStorage => 2,
            StorageClass::Ephemeral => 3,
        }
    }

    /// Get the next colder class, used as the single fallback hop for writes
    /// and deletes and as the idle-demotion target
    pub fn fallback_target(&self) -> Option<StorageClass> {
        match self {
            StorageClass::HotCache => Some(StorageClass::WarmCache),
            StorageClass::WarmCache => Some(StorageClass::ColdStorage),
            StorageClass::ColdStorage => Some(StorageClass::Ephemeral),
            StorageClass::Ephemeral => None,
        }
    }

    /// Get the next warmer class (promotion target)
    pub fn promotion_target(&self) -> Option<StorageClass> {
        match self {
            StorageClass::HotCache => None,
            StorageClass::WarmCache => Some(StorageClass::HotCache),
            StorageClass::ColdStorage => Some(StorageClass::WarmCache),
            StorageClass::Ephemeral => Some(StorageClass::ColdStorage),
        }
    }

    /// Check if this class is warmer (lower latency) than another
    pub fn is_warmer_than(&self, other: &StorageClass) -> bool {
        self.priority() < other.priority()
    }

    /// All classes in resolution order (warmest first)
    pub fn resolution_order() -> &'static [StorageClass] {
        &[
            StorageClass::HotCache,
            StorageClass::WarmCache,
            StorageClass::ColdStorage,
            StorageClass::Ephemeral,
        ]
    }

    /// The read chain starting at this class: self, then every colder class
    /// in order. Reads walk this chain until one tier serves the key.
    pub fn read_chain(&self) -> Vec<StorageClass> {
        StorageClass::resolution_order()
            .iter()
            .copied()
            .filter(|c| c.priority() >= self.priority())
            .collect()
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageClass::HotCache => write!(f, "hot_cache"),
            StorageClass::WarmCache => write!(f, "warm_cache"),
            StorageClass::ColdStorage => write!(f, "cold_storage"),
            StorageClass::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

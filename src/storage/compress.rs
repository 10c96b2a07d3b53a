//! Payload Compression
//!
//! Compression for values demoted to colder tiers. Compressed payloads are
//! stored as a tagged JSON wrapper so they survive backends that only hold
//! JSON text; reads through the router unwrap transparently. Bare adapters
//! never compress or decode.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Wrapper field marking a compressed payload
const WRAPPER_TAG: &str = "__tierstore_compressed";

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Algorithm to use for demoted payloads
    pub algorithm: CompressionAlgorithm,
    /// Minimum serialized size to compress (smaller payloads stay plain)
    pub min_size_bytes: u64,
    /// Compression level (algorithm-specific)
    pub level: i32,
    /// Whether to fall back to the plain payload on compression failure
    pub fallback_on_failure: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            min_size_bytes: 1024,
            level: 3,
            fallback_on_failure: true,
        }
    }
}

/// Compression algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Lz4,
    Zstd,
    Snappy,
}

impl CompressionAlgorithm {
    /// Parse from a wrapper tag value
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "none" => Some(CompressionAlgorithm::None),
            "lz4" => Some(CompressionAlgorithm::Lz4),
            "zstd" => Some(CompressionAlgorithm::Zstd),
            "snappy" => Some(CompressionAlgorithm::Snappy),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::None => write!(f, "none"),
            CompressionAlgorithm::Lz4 => write!(f, "lz4"),
            CompressionAlgorithm::Zstd => write!(f, "zstd"),
            CompressionAlgorithm::Snappy => write!(f, "snappy"),
        }
    }
}

// =============================================================================
// Compressors
// =============================================================================

fn compress_bytes(algorithm: CompressionAlgorithm, level: i32, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Lz4 => lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(level)),
            true,
        )
        .map_err(|e| Error::Compression(format!("LZ4 compression failed: {}", e))),
        CompressionAlgorithm::Zstd => zstd::encode_all(data, level)
            .map_err(|e| Error::Compression(format!("Zstd compression failed: {}", e))),
        CompressionAlgorithm::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::Compression(format!("Snappy compression failed: {}", e))),
    }
}

fn decompress_bytes(algorithm: CompressionAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::None => Ok(data.to_vec()),
        CompressionAlgorithm::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| Error::Compression(format!("LZ4 decompression failed: {}", e))),
        CompressionAlgorithm::Zstd => zstd::decode_all(data)
            .map_err(|e| Error::Compression(format!("Zstd decompression failed: {}", e))),
        CompressionAlgorithm::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::Compression(format!("Snappy decompression failed: {}", e))),
    }
}

// =============================================================================
// Payload Codec
// =============================================================================

/// Extract the wrapper tag and hex data from a stored value, owned so the
/// caller can still move the value when no wrapper is present
fn wrapper_parts(value: &Value) -> Option<(String, Option<String>)> {
    let obj = value.as_object()?;
    let tag = obj.get(WRAPPER_TAG)?.as_str()?.to_string();
    let data = obj.get("data").and_then(Value::as_str).map(str::to_string);
    Some((tag, data))
}

/// Sizes observed while encoding a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSizes {
    pub original: u64,
    pub compressed: u64,
}

/// Encodes/decodes JSON payloads with optional compression wrapping
pub struct PayloadCodec {
    config: CompressionConfig,
}

impl PayloadCodec {
    /// Create a codec with the given configuration
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Wrap `value` for cold storage, compressing when it pays off
    ///
    /// Returns the value to store plus the observed sizes when compression
    /// was applied. Payloads below the size threshold, incompressible
    /// payloads, and `None`-algorithm configs pass through unchanged.
    pub fn encode(&self, value: &Value) -> Result<(Value, Option<CompressionSizes>)> {
        if self.config.algorithm == CompressionAlgorithm::None {
            return Ok((value.clone(), None));
        }

        let plain = serde_json::to_vec(value)?;
        let original = plain.len() as u64;
        if original < self.config.min_size_bytes {
            return Ok((value.clone(), None));
        }

        let compressed = match compress_bytes(self.config.algorithm, self.config.level, &plain) {
            Ok(c) => c,
            Err(e) if self.config.fallback_on_failure => {
                tracing::warn!(algorithm = %self.config.algorithm, error = %e, "compression failed, storing plain payload");
                return Ok((value.clone(), None));
            }
            Err(e) => return Err(e),
        };

        // Hex doubles the byte count, so the wrapper only pays off when the
        // compressed form is well under half the plain size.
        if compressed.len() * 2 >= plain.len() {
            return Ok((value.clone(), None));
        }

        let sizes = CompressionSizes {
            original,
            compressed: compressed.len() as u64,
        };
        let wrapped = json!({
            WRAPPER_TAG: self.config.algorithm.to_string(),
            "data": hex::encode(compressed),
            "original_size": original,
        });
        Ok((wrapped, Some(sizes)))
    }

    /// Unwrap a stored value, decompressing when it carries the wrapper tag
    pub fn decode(&self, value: Value) -> Result<(Value, Option<CompressionSizes>)> {
        let Some((tag, data)) = wrapper_parts(&value) else {
            return Ok((value, None));
        };

        let algorithm = CompressionAlgorithm::from_tag(&tag).ok_or_else(|| {
            Error::Compression(format!("unknown compression algorithm tag: {}", tag))
        })?;
        let data = data
            .ok_or_else(|| Error::Compression("compressed wrapper missing data field".into()))?;
        let compressed = hex::decode(&data)
            .map_err(|e| Error::Compression(format!("invalid hex payload: {}", e)))?;
        let compressed_size = compressed.len() as u64;

        let plain = decompress_bytes(algorithm, &compressed)?;
        let original = plain.len() as u64;
        let value: Value = serde_json::from_slice(&plain)?;
        Ok((
            value,
            Some(CompressionSizes {
                original,
                compressed: compressed_size,
            }),
        ))
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

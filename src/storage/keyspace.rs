//! Keyspace Classification
//!
//! Derives a coarse "keyspace" label from a key's naming convention, used
//! only to group operation metrics without exposing full key cardinality.
//! Keys follow a `snake_case` convention where leading lowercase tokens name
//! the keyspace and trailing tokens carry identifiers (tickers, numeric ids,
//! dates): `market_cache_QQQ` -> `market_cache`, `job_status_12345` ->
//! `job_status`.

/// Derive the keyspace bucket for a key
///
/// Leading all-lowercase-alphabetic tokens form the keyspace; the first
/// token containing digits, uppercase letters, or punctuation ends it. Keys
/// with no classifiable leading token map to `"other"`.
pub fn keyspace(key: &str) -> String {
    let tokens: Vec<&str> = key
        .split('_')
        .take_while(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_lowercase()))
        .collect();

    if tokens.is_empty() {
        "other".to_string()
    } else {
        tokens.join("_")
    }
}

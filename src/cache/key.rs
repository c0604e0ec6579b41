//! Deterministic cache key derivation.
//!
//! Keys must stay identical across processes and backends so cached data written by one
//! deployment can be read by another: `sha256(sha256(query) + path)`, where the inner digest is
//! skipped for an empty query.

// crates.io
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `value`.
pub fn hash(value: &str) -> String {
	format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Derive the cache key for a request path and query string.
pub fn cache_key(path: &str, query: &str) -> String {
	if query.is_empty() {
		hash(path)
	} else {
		let mut material = hash(query);

		material.push_str(path);

		hash(&material)
	}
}

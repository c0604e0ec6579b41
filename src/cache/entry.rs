//! Versioned on-disk representation of cached responses.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{cache::CacheError, response::EsiResponse};

/// Schema revision written into every cache entry.
pub const SCHEMA_VERSION: u16 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
	schema: u16,
	response: &'a EsiResponse,
}

#[derive(Deserialize)]
struct Envelope {
	schema: u16,
	response: serde_json::Value,
}

/// Serialise a response into a cache entry.
pub fn encode(response: &EsiResponse) -> Result<String, CacheError> {
	serde_json::to_string(&EnvelopeRef { schema: SCHEMA_VERSION, response }).map_err(|err| {
		CacheError::Serialization { message: format!("Failed to encode cache entry: {err}") }
	})
}

/// Decode a cache entry, rejecting entries written under another schema.
pub fn decode(raw: &str) -> Result<EsiResponse, CacheError> {
	let envelope: Envelope = serde_json::from_str(raw).map_err(|err| {
		CacheError::Serialization { message: format!("Failed to parse cache entry: {err}") }
	})?;

	if envelope.schema != SCHEMA_VERSION {
		return Err(CacheError::Serialization {
			message: format!("Unsupported cache entry schema {}", envelope.schema),
		});
	}

	serde_json::from_value(envelope.response).map_err(|err| CacheError::Serialization {
		message: format!("Failed to decode cached response: {err}"),
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn entries_carry_schema_version() {
		let response = EsiResponse::new("[1]", [("ETag", "\"x\""), ("Expires", "0")], 200);
		let raw = encode(&response).expect("encode");
		let value: serde_json::Value = serde_json::from_str(&raw).expect("json");

		assert_eq!(value["schema"], 1);
		assert_eq!(value["response"]["raw"], "[1]");
		assert_eq!(decode(&raw).expect("decode"), response);
	}

	#[test]
	fn other_schemas_are_rejected() {
		let response = EsiResponse::new("[1]", [("ETag", "\"x\"")], 200);
		let raw = encode(&response).expect("encode").replace("\"schema\":1", "\"schema\":2");

		assert!(matches!(decode(&raw), Err(CacheError::Serialization { .. })));
		assert!(decode("{}").is_err());
	}
}

//! Response records describing the outcome of one ESI exchange.
//!
//! A record is built once per exchange, either from the network or from the cache. Apart from
//! the expiry (advanced in place after a successful conditional revalidation) and the one-way
//! provenance transition, it is never mutated after construction.

// std
use std::collections::BTreeMap;
// crates.io
use chrono::SubsecRound;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
// self
use crate::_prelude::*;

/// Header carrying the absolute expiry of the payload.
pub const HEADER_EXPIRES: &str = "expires";
/// Validator header used for conditional revalidation.
pub const HEADER_ETAG: &str = "etag";
/// Remaining error budget advertised by the API.
pub const HEADER_ERROR_LIMIT_REMAIN: &str = "x-esi-error-limit-remain";
/// Number of pages available for a paginated resource.
pub const HEADER_PAGES: &str = "x-pages";

const BAD_GATEWAY_MESSAGE: &str = "Bad gateway";

/// Where the body of a record was served from.
///
/// The only legal transition is `Network` to `Cache`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provenance {
	/// Body came from a fresh network fetch.
	#[default]
	Network,
	/// Body was served from the response cache.
	Cache,
}

/// Immutable-after-construction record of one HTTP exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EsiResponse {
	raw: String,
	headers: BTreeMap<String, String>,
	expires_at: DateTime<Utc>,
	status: u16,
	error_message: Option<String>,
	error_limit: Option<u32>,
	pages: Option<u32>,
	#[serde(skip)]
	provenance: Provenance,
}
impl EsiResponse {
	/// Build a record from a raw body, header pairs, and status code.
	///
	/// Header names are matched case-insensitively; repeated names are joined with `;`.
	pub fn new<I, K, V>(raw: impl Into<String>, headers: I, status: u16) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut normalized = BTreeMap::<String, String>::new();

		for (name, value) in headers {
			let name = name.as_ref().to_ascii_lowercase();
			let value = value.into();

			normalized
				.entry(name)
				.and_modify(|existing| {
					existing.push(';');
					existing.push_str(&value);
				})
				.or_insert(value);
		}

		let raw = raw.into();
		let expires_at = parse_expires(normalized.get(HEADER_EXPIRES).map(String::as_str));
		let error_message = parse_error_message(&raw, status);
		let error_limit = parse_number(normalized.get(HEADER_ERROR_LIMIT_REMAIN));
		let pages = parse_number(normalized.get(HEADER_PAGES));

		Self {
			raw,
			headers: normalized,
			expires_at,
			status,
			error_message,
			error_limit,
			pages,
			provenance: Provenance::Network,
		}
	}

	/// Build a record from an `http` header map, flattening multi-valued headers.
	///
	/// Values outside visible ASCII are decoded lossily rather than dropped.
	pub fn from_parts(raw: impl Into<String>, headers: &HeaderMap, status: StatusCode) -> Self {
		let pairs = headers.iter().map(|(name, value)| {
			(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())
		});

		Self::new(raw, pairs, status.as_u16())
	}

	/// Raw JSON body exactly as received.
	pub fn raw(&self) -> &str {
		&self.raw
	}

	/// Decode the raw body into a typed value.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(serde_json::from_str(&self.raw)?)
	}

	/// HTTP status code of the exchange.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// All headers, keyed by lowercase name.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}

	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Whether a header is present, ignoring case.
	pub fn has_header(&self, name: &str) -> bool {
		self.header(name).is_some()
	}

	/// Entity tag validator, if the origin supplied one.
	pub fn etag(&self) -> Option<&str> {
		self.header(HEADER_ETAG)
	}

	/// Absolute expiry of the payload.
	pub fn expires(&self) -> DateTime<Utc> {
		self.expires_at
	}

	/// Whether the payload has expired at the current instant.
	pub fn expired(&self) -> bool {
		self.expired_at(Utc::now())
	}

	/// Whether the payload has expired at the given instant.
	pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at <= now
	}

	/// Move the expiry, keeping the `Expires` header in step with it.
	///
	/// The header has whole-second precision, so sub-second parts are dropped from both.
	pub fn set_expires(&mut self, expires_at: DateTime<Utc>) {
		let expires_at = expires_at.trunc_subsecs(0);

		self.expires_at = expires_at;
		self.headers
			.insert(HEADER_EXPIRES.into(), httpdate::fmt_http_date(SystemTime::from(expires_at)));
	}

	/// Error message reported by the upstream, if any.
	pub fn error(&self) -> Option<&str> {
		self.error_message.as_deref()
	}

	/// Remaining error budget reported by the API.
	pub fn error_limit(&self) -> Option<u32> {
		self.error_limit
	}

	/// Page count for paginated resources.
	pub fn pages(&self) -> Option<u32> {
		self.pages
	}

	/// Provenance of the body.
	pub fn provenance(&self) -> Provenance {
		self.provenance
	}

	/// Whether the body was served from the cache.
	pub fn is_cached_load(&self) -> bool {
		matches!(self.provenance, Provenance::Cache)
	}

	/// Record that the body was served from the cache.
	pub fn mark_cached_load(&mut self) {
		self.provenance = Provenance::Cache;
	}
}

fn parse_expires(raw: Option<&str>) -> DateTime<Utc> {
	let now = Utc::now();

	match raw.map(str::trim) {
		Some(value) if value.len() > 2 => httpdate::parse_http_date(value)
			.map(DateTime::<Utc>::from)
			.unwrap_or_else(|err| {
				tracing::debug!(value, error = %err, "unparseable expires header");

				now
			}),
		_ => now,
	}
}

fn parse_error_message(raw: &str, status: u16) -> Option<String> {
	if status == StatusCode::BAD_GATEWAY.as_u16() {
		return Some(BAD_GATEWAY_MESSAGE.into());
	}

	let value = serde_json::from_str::<serde_json::Value>(raw).ok()?;
	let object = value.as_object()?;

	["error_description", "error"]
		.iter()
		.find_map(|field| object.get(*field).and_then(|value| value.as_str()).map(str::to_owned))
}

fn parse_number(raw: Option<&String>) -> Option<u32> {
	raw.and_then(|value| value.trim().parse().ok())
}

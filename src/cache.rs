//! Response cache: key derivation, pluggable backends, and the lookup contract.
//!
//! Backends only persist opaque strings under derived keys. [`CacheStore`] layers the response
//! semantics on top: serialisation, purge of stale entries that cannot be revalidated, and
//! swallowing backend failures so a broken cache never fails an API call.

pub mod entry;
pub mod file;
pub mod key;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use file::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "redis")] pub use redis::RedisBackend;

// std
use std::{fmt::Debug, future::Future, pin::Pin};
// self
use crate::{
	_prelude::*,
	config::CacheSettings,
	response::{EsiResponse, HEADER_ETAG},
};

/// Boxed future returned by [`CacheBackend`] operations.
pub type CacheFuture<'a, T> =
	Pin<Box<dyn Future<Output = std::result::Result<T, CacheError>> + 'a + Send>>;

/// String-keyed persistence contract implemented by cache drivers.
///
/// Implementations own their concurrency safety (atomic renames, server-side atomicity).
pub trait CacheBackend
where
	Self: Debug + Send + Sync,
{
	/// Load the value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

	/// Store `value` under `key`, replacing any previous value.
	fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()>;

	/// Whether a value exists under `key`.
	fn has<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool>;

	/// Remove the value under `key`; removing a missing key succeeds.
	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Error type produced by [`CacheBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
	/// Stored payload could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl From<CacheError> for Error {
	fn from(value: CacheError) -> Self {
		Self::Cache(value.to_string())
	}
}

/// Backend that stores nothing and never finds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;
impl CacheBackend for NullBackend {
	fn get<'a>(&'a self, _: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async { Ok(None) })
	}

	fn set<'a>(&'a self, _: &'a str, _: String) -> CacheFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}

	fn has<'a>(&'a self, _: &'a str) -> CacheFuture<'a, bool> {
		Box::pin(async { Ok(false) })
	}

	fn forget<'a>(&'a self, _: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}
}

/// Response cache keyed by request path and query string.
#[derive(Clone, Debug)]
pub struct CacheStore {
	backend: Arc<dyn CacheBackend>,
}
impl CacheStore {
	/// Wrap a backend.
	pub fn new<B>(backend: B) -> Self
	where
		B: 'static + CacheBackend,
	{
		Self { backend: Arc::new(backend) }
	}

	/// Wrap a shared backend.
	pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
		Self { backend }
	}

	/// Cache that discards writes and always misses.
	pub fn disabled() -> Self {
		Self::new(NullBackend)
	}

	/// Build the backend selected by the configuration.
	pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
		let store = match settings {
			CacheSettings::None => Self::disabled(),
			CacheSettings::Memory => Self::new(MemoryBackend::new()),
			CacheSettings::File { path } => Self::new(FileBackend::open(path)?),
			#[cfg(feature = "redis")]
			CacheSettings::Redis { url, prefix } =>
				Self::new(RedisBackend::new(::redis::Client::open(url.as_str())?, prefix.as_str())),
			#[cfg(not(feature = "redis"))]
			CacheSettings::Redis { .. } =>
				return Err(Error::Validation {
					field: "cache",
					reason: "Redis caching requires the `redis` cargo feature.".into(),
				}),
		};

		Ok(store)
	}

	/// Look up a cached response.
	///
	/// An expired entry without an `ETag` cannot be revalidated, so it is purged and reported
	/// absent. An expired entry with an `ETag` is returned for the caller to revalidate.
	pub async fn get(&self, path: &str, query: &str) -> Option<EsiResponse> {
		let key = key::cache_key(path, query);
		let raw = match self.backend.get(&key).await {
			Ok(Some(raw)) => raw,
			Ok(None) => return None,
			Err(err) => {
				tracing::warn!(path, error = %err, "cache read failed");

				return None;
			},
		};
		let response = match entry::decode(&raw) {
			Ok(response) => response,
			Err(err) => {
				tracing::debug!(path, error = %err, "discarding unreadable cache entry");
				self.forget_key(&key).await;

				return None;
			},
		};

		if response.expired() && !response.has_header(HEADER_ETAG) {
			tracing::debug!(path, "purging expired cache entry without validator");
			self.forget_key(&key).await;

			return None;
		}

		Some(response)
	}

	/// Store a response, replacing any previous entry. Failures are logged and dropped.
	pub async fn set(&self, path: &str, query: &str, response: &EsiResponse) {
		let key = key::cache_key(path, query);
		let result = match entry::encode(response) {
			Ok(raw) => self.backend.set(&key, raw).await,
			Err(err) => Err(err),
		};

		if let Err(err) = result {
			tracing::warn!(path, error = %err, "cache write failed");
		}
	}

	/// Whether [`get`](Self::get) would return an entry.
	pub async fn has(&self, path: &str, query: &str) -> bool {
		self.get(path, query).await.is_some()
	}

	/// Remove an entry. Failures are logged and dropped.
	pub async fn forget(&self, path: &str, query: &str) {
		self.forget_key(&key::cache_key(path, query)).await;
	}

	async fn forget_key(&self, key: &str) {
		if let Err(err) = self.backend.forget(key).await {
			tracing::warn!(key, error = %err, "cache delete failed");
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response_expiring_in(seconds: i64, etag: Option<&str>) -> EsiResponse {
		let expires = httpdate::fmt_http_date(SystemTime::from(
			Utc::now() + TimeDelta::seconds(seconds),
		));
		let mut headers = vec![("Expires".to_string(), expires)];

		if let Some(etag) = etag {
			headers.push(("ETag".to_string(), etag.to_string()));
		}

		EsiResponse::new(r#"{"name":"Some Pilot"}"#, headers, 200)
	}

	#[derive(Debug)]
	struct FailingBackend;
	impl CacheBackend for FailingBackend {
		fn get<'a>(&'a self, _: &'a str) -> CacheFuture<'a, Option<String>> {
			Box::pin(async { Err(CacheError::Backend { message: "down".into() }) })
		}

		fn set<'a>(&'a self, _: &'a str, _: String) -> CacheFuture<'a, ()> {
			Box::pin(async { Err(CacheError::Backend { message: "down".into() }) })
		}

		fn has<'a>(&'a self, _: &'a str) -> CacheFuture<'a, bool> {
			Box::pin(async { Err(CacheError::Backend { message: "down".into() }) })
		}

		fn forget<'a>(&'a self, _: &'a str) -> CacheFuture<'a, ()> {
			Box::pin(async { Err(CacheError::Backend { message: "down".into() }) })
		}
	}

	#[tokio::test]
	async fn stores_and_returns_fresh_entries() {
		let store = CacheStore::new(MemoryBackend::new());
		let response = response_expiring_in(300, None);

		store.set("/latest/characters/1/", "datasource=tranquility", &response).await;

		let cached =
			store.get("/latest/characters/1/", "datasource=tranquility").await.expect("cached");

		assert_eq!(cached, response);
		assert!(store.has("/latest/characters/1/", "datasource=tranquility").await);
		assert!(!store.has("/latest/characters/1/", "datasource=singularity").await);
	}

	#[tokio::test]
	async fn expired_entry_without_etag_is_purged() {
		let backend = Arc::new(MemoryBackend::new());
		let store = CacheStore::with_backend(backend.clone());

		store.set("/latest/status/", "", &response_expiring_in(-10, None)).await;

		assert_eq!(backend.len().await, 1);
		assert!(store.get("/latest/status/", "").await.is_none());
		assert_eq!(backend.len().await, 0);
	}

	#[tokio::test]
	async fn expired_entry_with_etag_is_kept_for_revalidation() {
		let store = CacheStore::new(MemoryBackend::new());

		store.set("/latest/status/", "", &response_expiring_in(-3600, Some("\"v1\""))).await;

		let cached = store.get("/latest/status/", "").await.expect("stale entry");

		assert!(cached.expired());
		assert_eq!(cached.etag(), Some("\"v1\""));
	}

	#[tokio::test]
	async fn forget_removes_entries() {
		let store = CacheStore::new(MemoryBackend::new());

		store.set("/latest/status/", "", &response_expiring_in(60, None)).await;
		store.forget("/latest/status/", "").await;
		store.forget("/latest/never-stored/", "").await;

		assert!(!store.has("/latest/status/", "").await);
	}

	#[tokio::test]
	async fn disabled_store_never_hits() {
		let store = CacheStore::disabled();

		store.set("/latest/status/", "", &response_expiring_in(60, None)).await;

		assert!(store.get("/latest/status/", "").await.is_none());
		assert!(!store.has("/latest/status/", "").await);
	}

	#[tokio::test]
	async fn backend_failures_are_swallowed() {
		let store = CacheStore::new(FailingBackend);

		store.set("/latest/status/", "", &response_expiring_in(60, None)).await;
		store.forget("/latest/status/", "").await;

		assert!(store.get("/latest/status/", "").await.is_none());
	}

	#[tokio::test]
	async fn unreadable_entries_are_discarded() {
		let backend = Arc::new(MemoryBackend::new());
		let store = CacheStore::with_backend(backend.clone());
		let key = key::cache_key("/latest/status/", "");

		backend.set(&key, "not json".into()).await.expect("raw set");

		assert!(store.get("/latest/status/", "").await.is_none());
		assert_eq!(backend.len().await, 0);
	}
}

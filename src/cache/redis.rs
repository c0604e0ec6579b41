//! Redis-backed cache.
//!
//! Entries are written without a server-side TTL: stale entries that carry an `ETag` must stay
//! readable so they can be revalidated.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use ::redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use tokio::sync::OnceCell;
// self
use crate::{
	_prelude::*,
	cache::{CacheBackend, CacheError, CacheFuture},
};

/// Stores entries in Redis under `prefix:key`.
///
/// All operations share one multiplexed [`ConnectionManager`], which reconnects on its own after
/// connection loss.
#[derive(Clone)]
pub struct RedisBackend {
	client: Client,
	manager: Arc<OnceCell<ConnectionManager>>,
	prefix: Arc<str>,
}
impl RedisBackend {
	/// Create a backend with the given key namespace.
	///
	/// The connection is established by the first cache operation.
	pub fn new(client: Client, prefix: impl Into<Arc<str>>) -> Self {
		Self { client, manager: Arc::new(OnceCell::new()), prefix: prefix.into() }
	}

	/// Create a backend and establish its connection up front.
	pub async fn connect(
		client: Client,
		prefix: impl Into<Arc<str>>,
	) -> std::result::Result<Self, CacheError> {
		let backend = Self::new(client, prefix);

		backend.connection().await?;

		Ok(backend)
	}

	/// Whether the shared connection has been established.
	pub fn is_connected(&self) -> bool {
		self.manager.initialized()
	}

	fn key(&self, key: &str) -> String {
		format!("{}:{key}", self.prefix)
	}

	async fn connection(&self) -> std::result::Result<ConnectionManager, CacheError> {
		self.manager
			.get_or_try_init(|| ConnectionManager::new(self.client.clone()))
			.await
			.cloned()
			.map_err(backend_error)
	}
}
impl Debug for RedisBackend {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("RedisBackend")
			.field("prefix", &self.prefix)
			.field("connected", &self.is_connected())
			.finish()
	}
}
impl CacheBackend for RedisBackend {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.get::<_, Option<String>>(self.key(key)).await.map_err(backend_error)
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.set::<_, _, ()>(self.key(key), value).await.map_err(backend_error)
		})
	}

	fn has<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.exists::<_, bool>(self.key(key)).await.map_err(backend_error)
		})
	}

	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let mut conn = self.connection().await?;

			conn.del::<_, ()>(self.key(key)).await.map_err(backend_error)
		})
	}
}

fn backend_error(err: RedisError) -> CacheError {
	CacheError::Backend { message: err.to_string() }
}

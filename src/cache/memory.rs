//! In-process cache backend.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::RwLock;
// self
use crate::cache::{CacheBackend, CacheFuture};

/// Keeps entries in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
	entries: RwLock<HashMap<String, String>>,
}
impl MemoryBackend {
	/// Create an empty backend.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored entries.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	/// Whether the backend holds no entries.
	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}
impl CacheBackend for MemoryBackend {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.entries.read().await.get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.entries.write().await.insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn has<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool> {
		Box::pin(async move { Ok(self.entries.read().await.contains_key(key)) })
	}

	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.entries.write().await.remove(key);

			Ok(())
		})
	}
}

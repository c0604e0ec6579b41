//! File-backed cache storing one JSON document per key.

// std
use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::fs;
// self
use crate::cache::{CacheBackend, CacheError, CacheFuture};

/// Persists entries below a directory, replacing files via atomic rename.
#[derive(Debug)]
pub struct FileBackend {
	root: PathBuf,
	sequence: AtomicU64,
}
impl FileBackend {
	/// Open (or create) the cache directory.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
		let root = root.into();

		std::fs::create_dir_all(&root).map_err(|e| CacheError::Backend {
			message: format!("Failed to create cache directory {}: {e}", root.display()),
		})?;

		Ok(Self { root, sequence: AtomicU64::new(0) })
	}

	/// Directory holding the cache entries.
	pub fn root(&self) -> &Path {
		&self.root
	}

	fn entry_path(&self, key: &str) -> PathBuf {
		self.root.join(format!("{key}.json"))
	}

	fn temp_path(&self, key: &str) -> PathBuf {
		let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

		self.root.join(format!(".{key}.{}.{sequence}.tmp", std::process::id()))
	}
}
impl CacheBackend for FileBackend {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move {
			let path = self.entry_path(key);

			match fs::read_to_string(&path).await {
				Ok(contents) => Ok(Some(contents)),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
				Err(e) => Err(CacheError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
			}
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let path = self.entry_path(key);
			let tmp_path = self.temp_path(key);

			fs::write(&tmp_path, value.as_bytes()).await.map_err(|e| CacheError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;

			if let Err(e) = fs::rename(&tmp_path, &path).await {
				let _ = fs::remove_file(&tmp_path).await;

				return Err(CacheError::Backend {
					message: format!("Failed to replace {}: {e}", path.display()),
				});
			}

			Ok(())
		})
	}

	fn has<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool> {
		Box::pin(async move {
			let path = self.entry_path(key);

			fs::try_exists(&path).await.map_err(|e| CacheError::Backend {
				message: format!("Failed to inspect {}: {e}", path.display()),
			})
		})
	}

	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			let path = self.entry_path(key);

			match fs::remove_file(&path).await {
				Ok(()) => Ok(()),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
				Err(e) => Err(CacheError::Backend {
					message: format!("Failed to remove {}: {e}", path.display()),
				}),
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::env;
	// self
	use super::*;
	use crate::{_prelude::*, cache::CacheStore, response::EsiResponse};

	fn temp_root() -> PathBuf {
		let unique = format!(
			"esi_client_file_cache_{}_{}",
			std::process::id(),
			Utc::now().timestamp_nanos_opt().unwrap_or_default(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn raw_values_round_trip_and_forget_is_idempotent() {
		let root = temp_root();
		let backend = FileBackend::open(&root).expect("Failed to open file cache.");

		assert_eq!(backend.get("missing").await.expect("get"), None);

		backend.set("k1", "first".into()).await.expect("set");
		backend.set("k1", "second".into()).await.expect("overwrite");

		assert!(backend.has("k1").await.expect("has"));
		assert_eq!(backend.get("k1").await.expect("get").as_deref(), Some("second"));

		backend.forget("k1").await.expect("forget");
		backend.forget("k1").await.expect("forget twice");

		assert!(!backend.has("k1").await.expect("has"));

		std::fs::remove_dir_all(&root).expect("Failed to remove temporary cache directory.");
	}

	#[tokio::test]
	async fn entries_survive_reopen() {
		let root = temp_root();
		let expires =
			httpdate::fmt_http_date(SystemTime::from(Utc::now() + TimeDelta::seconds(120)));
		let response = EsiResponse::new("{\"players\":30000}", [("Expires", expires)], 200);

		CacheStore::new(FileBackend::open(&root).expect("open"))
			.set("/latest/status/", "datasource=tranquility", &response)
			.await;

		let reopened = CacheStore::new(FileBackend::open(&root).expect("reopen"));
		let cached = reopened
			.get("/latest/status/", "datasource=tranquility")
			.await
			.expect("File cache lost entry after reopen.");

		assert_eq!(cached.raw(), "{\"players\":30000}");

		std::fs::remove_dir_all(&root).expect("Failed to remove temporary cache directory.");
	}
}

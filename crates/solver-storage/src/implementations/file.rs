//! File-backed storage.
//!
//! Each key maps to one file under the base directory. Writes go to a unique
//! temporary file first, so readers never observe partial values. TTLs are
//! not enforced by this backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;

pub struct FileStorage {
	base_path: PathBuf,
	write_seq: AtomicU64,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_seq: AtomicU64::new(0),
		}
	}

	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}

	/// Writes `value` to a fresh temporary file next to `path`.
	async fn write_temp(&self, path: &std::path::Path, value: &[u8]) -> Result<PathBuf, StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
		let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(temp_path)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		_ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		let temp_path = self.write_temp(&path, &value).await?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn set_nx(
		&self,
		key: &str,
		value: Vec<u8>,
		_ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let path = self.file_path(key);
		let temp_path = self.write_temp(&path, &value).await?;

		// Linking fails if the target exists, which makes the check and the write atomic.
		let linked = fs::hard_link(&temp_path, &path).await;
		let _ = fs::remove_file(&temp_path).await;

		match linked {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

/// Factory for the file backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: `./data/storage`)
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Box::new(FileStorage::new(PathBuf::from(storage_path)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_round_trip_and_overwrite() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("intents:0xabc", b"one".to_vec(), None).await.unwrap();
		storage.set_bytes("intents:0xabc", b"two".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes("intents:0xabc").await.unwrap(), b"two".to_vec());
		assert!(dir.path().join("intents_0xabc.json").exists());
	}

	#[tokio::test]
	async fn test_set_nx_keeps_first_value_and_cleans_temp_files() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		assert!(storage.set_nx("k", b"first".to_vec(), None).await.unwrap());
		assert!(!storage.set_nx("k", b"second".to_vec(), None).await.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"first".to_vec());

		let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
		assert_eq!(files.len(), 1);
	}

	#[tokio::test]
	async fn test_missing_key() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().join("nested"));

		assert!(!storage.exists("nope").await.unwrap());
		assert!(matches!(
			storage.get_bytes("nope").await,
			Err(StorageError::NotFound(_))
		));
		storage.delete("nope").await.unwrap();
	}
}

//! In-memory storage backend.
//!
//! Data lives for the lifetime of the process. Expired entries are treated as
//! absent and dropped lazily when next written.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl.map(|d| Instant::now() + d),
		}
	}

	fn is_live(&self) -> bool {
		self.expires_at.map_or(true, |t| Instant::now() < t)
	}
}

#[derive(Default)]
pub struct MemoryStorage {
	entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let entries = self.entries.read().await;
		match entries.get(key) {
			Some(entry) if entry.is_live() => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound(key.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.entries
			.write()
			.await
			.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn set_nx(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut entries = self.entries.write().await;
		if entries.get(key).is_some_and(Entry::is_live) {
			return Ok(false);
		}
		entries.insert(key.to_string(), Entry::new(value, ttl));
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self
			.entries
			.read()
			.await
			.get(key)
			.is_some_and(Entry::is_live))
	}
}

/// Factory for the memory backend. It takes no settings.
pub fn create_storage(_config: &toml::Value) -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	#[tokio::test]
	async fn test_set_nx_only_writes_once() {
		let storage = MemoryStorage::new();
		assert!(storage.set_nx("k", b"a".to_vec(), None).await.unwrap());
		assert!(!storage.set_nx("k", b"b".to_vec(), None).await.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"a".to_vec());
	}

	#[tokio::test]
	async fn test_concurrent_set_nx_has_single_winner() {
		let storage = Arc::new(MemoryStorage::new());
		let tasks: Vec<_> = (0..16u8)
			.map(|i| {
				let storage = storage.clone();
				tokio::spawn(async move { storage.set_nx("race", vec![i], None).await.unwrap() })
			})
			.collect();

		let mut winners = 0;
		for task in tasks {
			if task.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn test_expired_entries_are_absent() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("short", b"x".to_vec(), Some(Duration::from_millis(1)))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert!(!storage.exists("short").await.unwrap());
		assert!(matches!(
			storage.get_bytes("short").await,
			Err(StorageError::NotFound(_))
		));
		assert!(storage.set_nx("short", b"y".to_vec(), None).await.unwrap());
	}

	#[tokio::test]
	async fn test_delete() {
		let storage = MemoryStorage::new();
		storage.set_bytes("k", b"v".to_vec(), None).await.unwrap();
		storage.delete("k").await.unwrap();
		storage.delete("k").await.unwrap();
		assert!(!storage.exists("k").await.unwrap());
	}
}

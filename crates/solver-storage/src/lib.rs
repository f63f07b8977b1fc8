//! Storage for the intent admission pipeline.
//!
//! A small key/value contract ([`StorageInterface`]) is implemented by an
//! in-memory and a file backend. [`StorageService`] adds JSON typing on top,
//! and [`intents`] builds the intent record store from it.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use solver_types::IntentStatus;
use std::time::Duration;
use thiserror::Error;

pub mod intents;

pub use intents::{IntentStore, RecordedBlock, StorageIntentStore};
#[cfg(any(test, feature = "testing"))]
pub use intents::MockIntentStore;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Status cannot move from {from} to {to}")]
	InvalidTransition { from: IntentStatus, to: IntentStatus },
}

/// Low-level key/value contract implemented by storage backends.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Stores the value only if `key` is absent. Returns whether it was stored.
	async fn set_nx(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Typed JSON storage over a backend, keyed by `namespace:id`.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores `data` unless the id already exists. Returns whether it was stored.
	pub async fn store_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.set_nx(&Self::key(namespace, id), bytes, None)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps a missing id to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mockall::predicate::eq;

	#[tokio::test]
	async fn test_find_maps_not_found_to_none() {
		let mut backend = MockStorageInterface::new();
		backend
			.expect_get_bytes()
			.with(eq("intents:missing"))
			.returning(|key| Err(StorageError::NotFound(key.to_string())));
		backend
			.expect_get_bytes()
			.with(eq("intents:broken"))
			.returning(|_| Err(StorageError::Backend("disk on fire".into())));

		let service = StorageService::new(Box::new(backend));
		let missing: Option<u32> = service.find("intents", "missing").await.unwrap();
		assert!(missing.is_none());
		assert!(matches!(
			service.find::<u32>("intents", "broken").await,
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_store_if_absent_uses_set_nx() {
		let mut backend = MockStorageInterface::new();
		backend
			.expect_set_nx()
			.withf(|key, value, ttl| key == "ns:1" && value == b"42" && ttl.is_none())
			.times(1)
			.returning(|_, _, _| Ok(false));

		let service = StorageService::new(Box::new(backend));
		assert!(!service.store_if_absent("ns", "1", &42u32).await.unwrap());
	}
}

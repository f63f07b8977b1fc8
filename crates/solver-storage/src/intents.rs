//! Intent record store.
//!
//! Records are keyed by intent hash. Alongside them the store keeps, per
//! source chain, the highest block any recorded log came from, so the most
//! recent recorded transaction for a chain is a point lookup rather than a
//! scan.

use crate::{StorageError, StorageService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solver_types::{ChainId, IntentRecord, IntentStatus, ValidationChecks, B256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const INTENTS_NAMESPACE: &str = "intents";
const CHAIN_HEADS_NAMESPACE: &str = "intent_chain_heads";

/// The most recent recorded log for a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedBlock {
	pub chain_id: ChainId,
	pub block_number: u64,
	pub transaction_hash: Option<B256>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IntentStore: Send + Sync {
	/// Point lookup by intent hash.
	async fn find_by_hash(&self, hash: &B256) -> Result<Option<IntentRecord>, StorageError>;

	/// Most recently recorded log for `chain_id`, by block number.
	async fn last_recorded(&self, chain_id: ChainId) -> Result<Option<RecordedBlock>, StorageError>;

	/// Inserts a new record. Returns `false` if one already exists for the hash.
	async fn insert(&self, record: &IntentRecord) -> Result<bool, StorageError>;

	/// Moves a record to `status`, optionally attaching validation results.
	async fn update_status(
		&self,
		hash: &B256,
		status: IntentStatus,
		validations: Option<ValidationChecks>,
	) -> Result<(), StorageError>;
}

/// [`IntentStore`] over a [`StorageService`].
pub struct StorageIntentStore {
	storage: Arc<StorageService>,
	head_lock: Mutex<()>,
	update_lock: Mutex<()>,
}

impl StorageIntentStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			head_lock: Mutex::new(()),
			update_lock: Mutex::new(()),
		}
	}

	async fn advance_chain_head(&self, record: &IntentRecord) -> Result<(), StorageError> {
		let Some(event) = record.event.as_ref() else {
			return Ok(());
		};
		let Some(block_number) = event.block_number else {
			return Ok(());
		};
		let chain_id = event.source_chain_id.unwrap_or(record.intent.route.source);

		let _guard = self.head_lock.lock().await;
		let current: Option<RecordedBlock> = self
			.storage
			.find(CHAIN_HEADS_NAMESPACE, &chain_id.to_string())
			.await?;
		if current.is_some_and(|c| c.block_number >= block_number) {
			return Ok(());
		}

		debug!(chain_id, block_number, "Advancing recorded chain head");
		self.storage
			.store(
				CHAIN_HEADS_NAMESPACE,
				&chain_id.to_string(),
				&RecordedBlock {
					chain_id,
					block_number,
					transaction_hash: event.transaction_hash,
				},
			)
			.await
	}
}

#[async_trait]
impl IntentStore for StorageIntentStore {
	async fn find_by_hash(&self, hash: &B256) -> Result<Option<IntentRecord>, StorageError> {
		self.storage.find(INTENTS_NAMESPACE, &hash.to_string()).await
	}

	async fn last_recorded(&self, chain_id: ChainId) -> Result<Option<RecordedBlock>, StorageError> {
		self.storage
			.find(CHAIN_HEADS_NAMESPACE, &chain_id.to_string())
			.await
	}

	async fn insert(&self, record: &IntentRecord) -> Result<bool, StorageError> {
		let inserted = self
			.storage
			.store_if_absent(INTENTS_NAMESPACE, &record.intent.hash.to_string(), record)
			.await?;
		if inserted {
			self.advance_chain_head(record).await?;
		}
		Ok(inserted)
	}

	async fn update_status(
		&self,
		hash: &B256,
		status: IntentStatus,
		validations: Option<ValidationChecks>,
	) -> Result<(), StorageError> {
		let _guard = self.update_lock.lock().await;
		let id = hash.to_string();
		let mut record: IntentRecord = self.storage.retrieve(INTENTS_NAMESPACE, &id).await?;

		if !record.status.can_transition_to(status) {
			return Err(StorageError::InvalidTransition {
				from: record.status,
				to: status,
			});
		}

		record.status = status;
		if validations.is_some() {
			record.validations = validations;
		}
		self.storage.store(INTENTS_NAMESPACE, &id, &record).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use solver_types::{Address, Bytes, ChainLog, Intent, Reward, Route, U256};

	fn store() -> StorageIntentStore {
		StorageIntentStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn record(salt: u8, block: Option<u64>) -> IntentRecord {
		let intent = Intent::new(
			Route {
				salt: B256::repeat_byte(salt),
				source: 10,
				destination: 8453,
				inbox: Address::ZERO,
				tokens: vec![],
				calls: vec![],
			},
			Reward {
				creator: Address::ZERO,
				prover: Address::ZERO,
				deadline: 0,
				native_value: U256::ZERO,
				tokens: vec![],
			},
			0,
		);
		let event = block.map(|b| ChainLog {
			address: Address::ZERO,
			topics: vec![],
			data: Bytes::new(),
			block_number: Some(b),
			block_hash: None,
			transaction_hash: Some(B256::repeat_byte(b as u8)),
			transaction_index: None,
			log_index: Some(0),
			removed: false,
			source_chain_id: Some(10),
			source_network: Some("opt-mainnet".into()),
		});
		IntentRecord::new(event, intent, IntentStatus::Pending)
	}

	#[tokio::test]
	async fn test_insert_is_idempotent() {
		let store = store();
		let record = record(1, Some(100));

		assert!(store.insert(&record).await.unwrap());
		assert!(!store.insert(&record).await.unwrap());

		let found = store.find_by_hash(&record.intent.hash).await.unwrap();
		assert_eq!(found, Some(record));
		assert!(store.find_by_hash(&B256::ZERO).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_last_recorded_tracks_highest_block() {
		let store = store();
		assert!(store.last_recorded(10).await.unwrap().is_none());

		store.insert(&record(1, Some(120))).await.unwrap();
		store.insert(&record(2, Some(90))).await.unwrap();
		store.insert(&record(3, None)).await.unwrap();

		let head = store.last_recorded(10).await.unwrap().unwrap();
		assert_eq!(head.block_number, 120);
		assert_eq!(head.transaction_hash, Some(B256::repeat_byte(120)));
		assert!(store.last_recorded(8453).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_update_status_records_validations() {
		let store = store();
		let record = record(1, Some(5));
		store.insert(&record).await.unwrap();

		let checks = ValidationChecks::default();
		store
			.update_status(&record.intent.hash, IntentStatus::Invalid, Some(checks))
			.await
			.unwrap();

		let stored = store.find_by_hash(&record.intent.hash).await.unwrap().unwrap();
		assert_eq!(stored.status, IntentStatus::Invalid);
		assert_eq!(stored.validations, Some(checks));
	}

	#[tokio::test]
	async fn test_update_status_rejects_backward_moves() {
		let store = store();
		let record = record(1, None);
		store.insert(&record).await.unwrap();
		store
			.update_status(&record.intent.hash, IntentStatus::Invalid, None)
			.await
			.unwrap();

		let err = store
			.update_status(&record.intent.hash, IntentStatus::Pending, None)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			StorageError::InvalidTransition {
				from: IntentStatus::Invalid,
				to: IntentStatus::Pending
			}
		));
	}

	#[tokio::test]
	async fn test_update_missing_record() {
		let store = store();
		assert!(matches!(
			store
				.update_status(&B256::ZERO, IntentStatus::Invalid, None)
				.await,
			Err(StorageError::NotFound(_))
		));
	}
}

//! Admission of newly observed intents.

use crate::flags::{FeatureFlag, FeatureFlags};
use crate::wallet::SmartWalletValidator;
use crate::IntentError;
use solver_queue::{encode_payload, QueueInterface};
use solver_storage::IntentStore;
use solver_types::{
	decode_create_intent_log, intent_job_id, utils::truncate_hash, Address, ChainLog, EventBus, Intent,
	IntentEvent, IntentRecord, IntentStatus, JobName, JobOperation, Reward, Route, SolverEvent, B256,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// What [`IntentCreateGate::create_intent`] did with a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
	/// Stored as `PENDING` and queued for validation.
	Admitted(B256),
	/// A record for the hash already existed. Nothing was written.
	Duplicate(B256),
	/// Stored as `NON-BEND-WALLET`. Not queued.
	WalletRejected(B256),
	/// Decoding, persistence or submission failed. The error was logged.
	Failed(String),
}

/// Turns `IntentCreated` logs into intent records, exactly once per hash.
pub struct IntentCreateGate {
	store: Arc<dyn IntentStore>,
	queue: Arc<dyn QueueInterface>,
	flags: Arc<dyn FeatureFlags>,
	wallets: Arc<dyn SmartWalletValidator>,
	event_bus: EventBus,
}

impl IntentCreateGate {
	pub fn new(
		store: Arc<dyn IntentStore>,
		queue: Arc<dyn QueueInterface>,
		flags: Arc<dyn FeatureFlags>,
		wallets: Arc<dyn SmartWalletValidator>,
		event_bus: EventBus,
	) -> Self {
		Self {
			store,
			queue,
			flags,
			wallets,
			event_bus,
		}
	}

	/// Admits the intent carried by `log`.
	///
	/// Never returns an error: failures are logged and reported as
	/// [`CreateOutcome::Failed`] so the surrounding job is not redelivered.
	pub async fn create_intent(&self, log: ChainLog) -> CreateOutcome {
		match self.try_create_intent(log).await {
			Ok(outcome) => outcome,
			Err(e) => {
				error!(error = %e, "Failed to create intent");
				CreateOutcome::Failed(e.to_string())
			}
		}
	}

	async fn try_create_intent(&self, log: ChainLog) -> Result<CreateOutcome, IntentError> {
		let decoded = decode_create_intent_log(&log.data, &log.topics)?;
		let intent = Intent::new(decoded.route, decoded.reward, log.log_index_or_default());
		let hash = intent.hash;
		let short = truncate_hash(&hash.to_string());

		if self.store.find_by_hash(&hash).await?.is_some() {
			debug!(intent_hash = %short, "Record for intent already exists");
			return Ok(CreateOutcome::Duplicate(hash));
		}

		let valid_wallet = if self.flags.flag(FeatureFlag::BendWalletOnly) {
			let chain_id = log.source_chain_id.unwrap_or(intent.route.source);
			self.wallets
				.validate_smart_wallet(intent.reward.creator, chain_id)
				.await?
		} else {
			true
		};
		let status = if valid_wallet {
			IntentStatus::Pending
		} else {
			IntentStatus::NonBendWallet
		};

		let log_index = intent.log_index;
		let record = IntentRecord::new(Some(log), intent, status);
		if !self.store.insert(&record).await? {
			debug!(intent_hash = %short, "Record for intent already exists");
			return Ok(CreateOutcome::Duplicate(hash));
		}
		info!(intent_hash = %short, %status, "Recorded intent");
		self.event_bus
			.publish(SolverEvent::Intent(IntentEvent::Admitted {
				intent_hash: hash,
				status,
			}));

		if !valid_wallet {
			return Ok(CreateOutcome::WalletRejected(hash));
		}

		let job_id = intent_job_id(JobOperation::Validate, &hash, log_index);
		self.queue
			.add(JobName::ValidateIntent, job_id, encode_payload(&hash)?)
			.await?;
		Ok(CreateOutcome::Admitted(hash))
	}

	/// Records a gaslessly initiated intent. No log exists yet, so the record
	/// carries no event and is not queued.
	pub async fn create_intent_from_intent_initiation(
		&self,
		quote_id: String,
		funder: Address,
		route: Route,
		reward: Reward,
	) -> Result<IntentRecord, IntentError> {
		let mut intent = Intent::new(route, reward, 0);
		intent.funder = Some(funder);
		intent.quote_id = Some(quote_id);

		let record = IntentRecord::new(None, intent, IntentStatus::Pending);
		if self.store.insert(&record).await? {
			info!(
				intent_hash = %truncate_hash(&record.intent.hash.to_string()),
				"Recorded initiated intent"
			);
		}
		Ok(record)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::flags::MockFeatureFlags;
	use crate::wallet::MockSmartWalletValidator;
	use solver_queue::MockQueueInterface;
	use solver_storage::MockIntentStore;
	use solver_types::decode::encode_create_intent_log;
	use solver_types::{Bytes, Call, TokenAmount, U256};
	use std::sync::atomic::{AtomicBool, Ordering};

	fn route() -> Route {
		Route {
			salt: B256::repeat_byte(0x11),
			source: 10,
			destination: 8453,
			inbox: Address::repeat_byte(0xaa),
			tokens: vec![TokenAmount {
				token: Address::repeat_byte(0xbb),
				amount: U256::from(1_000_000u64),
			}],
			calls: vec![Call {
				target: Address::repeat_byte(0xbb),
				data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
				value: U256::ZERO,
			}],
		}
	}

	fn reward() -> Reward {
		Reward {
			creator: Address::repeat_byte(0xc1),
			prover: Address::repeat_byte(0xd1),
			deadline: 1_900_000_000,
			native_value: U256::ZERO,
			tokens: vec![],
		}
	}

	fn log() -> ChainLog {
		let (data, topics) = encode_create_intent_log(&route(), &reward());
		ChainLog {
			address: Address::repeat_byte(0xa0),
			topics,
			data,
			block_number: Some(100),
			block_hash: None,
			transaction_hash: Some(B256::repeat_byte(0x77)),
			transaction_index: None,
			log_index: Some(2),
			removed: false,
			source_chain_id: Some(10),
			source_network: Some("opt-mainnet".into()),
		}
	}

	fn flags(enabled: bool) -> Arc<dyn FeatureFlags> {
		let mut flags = MockFeatureFlags::new();
		flags.expect_flag().return_const(enabled);
		Arc::new(flags)
	}

	fn gate(
		store: MockIntentStore,
		queue: MockQueueInterface,
		flags: Arc<dyn FeatureFlags>,
		wallets: MockSmartWalletValidator,
	) -> IntentCreateGate {
		IntentCreateGate::new(
			Arc::new(store),
			Arc::new(queue),
			flags,
			Arc::new(wallets),
			EventBus::new(16),
		)
	}

	/// A store backed by a flag, so the second delivery sees the first insert.
	fn recording_store() -> MockIntentStore {
		let stored = Arc::new(AtomicBool::new(false));
		let mut store = MockIntentStore::new();
		let seen = stored.clone();
		store.expect_find_by_hash().returning(move |_| {
			Ok(seen
				.load(Ordering::SeqCst)
				.then(|| IntentRecord::new(None, Intent::new(route(), reward(), 0), IntentStatus::Pending)))
		});
		store.expect_insert().times(1).returning(move |record| {
			assert_eq!(record.status, IntentStatus::Pending);
			stored.store(true, Ordering::SeqCst);
			Ok(true)
		});
		store
	}

	#[tokio::test]
	async fn test_admission_is_idempotent() {
		let hash = Intent::new(route(), reward(), 2).hash;
		let expected_id = format!("validate-{}-2", hash);

		let mut queue = MockQueueInterface::new();
		queue
			.expect_add()
			.withf(move |name, id, payload| {
				*name == JobName::ValidateIntent
					&& *id == expected_id
					&& serde_json::from_value::<B256>(payload.clone()).ok() == Some(hash)
			})
			.times(1)
			.returning(|_, _, _| Ok(true));

		let gate = gate(
			recording_store(),
			queue,
			flags(false),
			MockSmartWalletValidator::new(),
		);
		let mut events = gate.event_bus.subscribe();

		assert_eq!(gate.create_intent(log()).await, CreateOutcome::Admitted(hash));
		assert_eq!(gate.create_intent(log()).await, CreateOutcome::Duplicate(hash));

		match events.recv().await.unwrap() {
			SolverEvent::Intent(IntentEvent::Admitted { intent_hash, status }) => {
				assert_eq!(intent_hash, hash);
				assert_eq!(status, IntentStatus::Pending);
			}
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_wallet_not_checked_when_flag_off() {
		let mut wallets = MockSmartWalletValidator::new();
		wallets.expect_validate_smart_wallet().times(0);
		let mut queue = MockQueueInterface::new();
		queue.expect_add().returning(|_, _, _| Ok(true));

		let gate = gate(recording_store(), queue, flags(false), wallets);
		assert!(matches!(gate.create_intent(log()).await, CreateOutcome::Admitted(_)));
	}

	#[tokio::test]
	async fn test_untrusted_wallet_is_recorded_but_not_queued() {
		let mut wallets = MockSmartWalletValidator::new();
		wallets
			.expect_validate_smart_wallet()
			.withf(|creator, chain_id| *creator == Address::repeat_byte(0xc1) && *chain_id == 10)
			.times(1)
			.returning(|_, _| Ok(false));

		let mut store = MockIntentStore::new();
		store.expect_find_by_hash().returning(|_| Ok(None));
		store
			.expect_insert()
			.withf(|record| record.status == IntentStatus::NonBendWallet && record.event.is_some())
			.times(1)
			.returning(|_| Ok(true));

		let mut queue = MockQueueInterface::new();
		queue.expect_add().times(0);

		let gate = gate(store, queue, flags(true), wallets);
		assert!(matches!(
			gate.create_intent(log()).await,
			CreateOutcome::WalletRejected(_)
		));
	}

	#[tokio::test]
	async fn test_decode_failure_is_swallowed() {
		let mut store = MockIntentStore::new();
		store.expect_find_by_hash().times(0);
		store.expect_insert().times(0);

		let gate = gate(
			store,
			MockQueueInterface::new(),
			flags(false),
			MockSmartWalletValidator::new(),
		);
		let mut bad = log();
		bad.data = Bytes::from(vec![1, 2, 3]);
		assert!(matches!(gate.create_intent(bad).await, CreateOutcome::Failed(_)));
	}

	#[tokio::test]
	async fn test_initiation_records_pending_without_event() {
		let mut store = MockIntentStore::new();
		store
			.expect_insert()
			.withf(|record| {
				record.status == IntentStatus::Pending
					&& record.event.is_none()
					&& record.intent.log_index == 0
					&& record.intent.quote_id.as_deref() == Some("quote-1")
			})
			.times(1)
			.returning(|_| Ok(true));

		let mut queue = MockQueueInterface::new();
		queue.expect_add().times(0);

		let gate = gate(store, queue, flags(true), MockSmartWalletValidator::new());
		let record = gate
			.create_intent_from_intent_initiation(
				"quote-1".to_string(),
				Address::repeat_byte(0xf0),
				route(),
				reward(),
			)
			.await
			.unwrap();
		assert_eq!(record.intent.funder, Some(Address::repeat_byte(0xf0)));
		assert_eq!(record.intent.hash, Intent::new(route(), reward(), 0).hash);
	}
}

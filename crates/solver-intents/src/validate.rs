//! Validation of admitted intents.
//!
//! An intent leaves this stage either `INVALID`, with every failed check
//! recorded, or queued for the feasibility stage.

use crate::validation::ValidationInterface;
use crate::IntentError;
use async_trait::async_trait;
use solver_chains::{contracts, ChainRegistry};
use solver_config::{IntentSourceConfig, IntentsConfig, SolverChainConfig};
use solver_queue::{encode_payload, QueueInterface};
use solver_storage::IntentStore;
use solver_types::{
	intent_job_id, utils::truncate_hash, EventBus, Intent, IntentEvent, IntentStatus, JobName,
	JobOperation, SolverEvent, B256,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait inserted before funding re-read number `attempt` (zero based).
#[async_trait]
pub trait RetryDelay: Send + Sync {
	async fn delay(&self, delay_ms: u64, attempt: u32);
}

/// Sleeps `delay_ms * 2^attempt`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExponentialDelay;

#[async_trait]
impl RetryDelay for ExponentialDelay {
	async fn delay(&self, delay_ms: u64, attempt: u32) {
		let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
		tokio::time::sleep(Duration::from_millis(delay_ms.saturating_mul(factor))).await;
	}
}

pub struct IntentValidator {
	store: Arc<dyn IntentStore>,
	queue: Arc<dyn QueueInterface>,
	validation: Arc<dyn ValidationInterface>,
	chains: Arc<ChainRegistry>,
	sources: Vec<IntentSourceConfig>,
	solvers: Vec<SolverChainConfig>,
	max_retries: u32,
	retry_delay_ms: u64,
	delay: Arc<dyn RetryDelay>,
	event_bus: EventBus,
}

impl IntentValidator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Arc<dyn IntentStore>,
		queue: Arc<dyn QueueInterface>,
		validation: Arc<dyn ValidationInterface>,
		chains: Arc<ChainRegistry>,
		sources: Vec<IntentSourceConfig>,
		solvers: Vec<SolverChainConfig>,
		intents: &IntentsConfig,
		event_bus: EventBus,
	) -> Self {
		Self {
			store,
			queue,
			validation,
			chains,
			sources,
			solvers,
			max_retries: intents.intent_funded_retries,
			retry_delay_ms: intents.intent_funded_retry_delay_ms,
			delay: Arc::new(ExponentialDelay),
			event_bus,
		}
	}

	pub fn with_retry_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
		self.delay = delay;
		self
	}

	/// Validates the recorded intent for `hash`.
	///
	/// Returns `Ok(false)` when the intent was marked invalid. A missing
	/// record or destination solver is [`IntentError::DestructureFailed`].
	pub async fn validate_intent(&self, hash: &B256) -> Result<bool, IntentError> {
		let record = self
			.store
			.find_by_hash(hash)
			.await?
			.ok_or(IntentError::DestructureFailed(*hash))?;
		let solver = self
			.solvers
			.iter()
			.find(|s| s.chain_id == record.intent.route.destination)
			.ok_or(IntentError::DestructureFailed(*hash))?;

		if !self.assert_validations(&record.intent, solver).await? {
			return Ok(false);
		}

		let job_id = intent_job_id(JobOperation::Feasible, hash, record.intent.log_index);
		self.queue
			.add(JobName::FeasableIntent, job_id, encode_payload(hash)?)
			.await?;
		info!(intent_hash = %truncate_hash(&hash.to_string()), "Intent validated");
		self.event_bus
			.publish(SolverEvent::Intent(IntentEvent::Validated { intent_hash: *hash }));
		Ok(true)
	}

	/// Runs the structural checks and the funding check. On any failure the
	/// record is marked `INVALID` with the full results.
	pub async fn assert_validations(
		&self,
		intent: &Intent,
		solver: &SolverChainConfig,
	) -> Result<bool, IntentError> {
		let mut checks = self.validation.assert_validations(intent, solver).await?;
		checks.intent_funded = self.intent_funded(intent).await?;

		if checks.passed() {
			return Ok(true);
		}

		let failed: Vec<String> = checks.failed_checks().into_iter().map(String::from).collect();
		warn!(
			intent_hash = %truncate_hash(&intent.hash.to_string()),
			?failed,
			"Intent failed validation"
		);
		self.store
			.update_status(&intent.hash, IntentStatus::Invalid, Some(checks))
			.await?;
		self.event_bus.publish(SolverEvent::Intent(IntentEvent::Invalid {
			intent_hash: intent.hash,
			failed,
		}));
		Ok(false)
	}

	/// Whether the intent source reports the reward as funded, re-reading up
	/// to the configured number of times while it does not.
	pub async fn intent_funded(&self, intent: &Intent) -> Result<bool, IntentError> {
		let chain_id = intent.route.source;
		let Some(source) = self.sources.iter().find(|s| s.chain_id == chain_id) else {
			error!(chain_id, "No intent source configured for source chain");
			return Ok(false);
		};
		let client = self.chains.get_required(chain_id)?;

		for attempt in 0..=self.max_retries {
			if attempt > 0 {
				self.delay.delay(self.retry_delay_ms, attempt - 1).await;
			}
			if contracts::is_intent_funded(client.as_ref(), source.source_address, intent).await? {
				return Ok(true);
			}
			debug!(
				intent_hash = %truncate_hash(&intent.hash.to_string()),
				attempt,
				"Intent not funded yet"
			);
		}
		Ok(false)
	}
}

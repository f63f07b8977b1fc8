//! Routing of queued jobs to the pipeline stages.
//!
//! Each stage decides how its failures are reported to the queue: errors
//! the stage already handled complete the job, transient failures are
//! redelivered and anything a retry cannot fix fails the job for good.

use crate::fulfillment::FulfillmentSink;
use async_trait::async_trait;
use solver_fee::FeeFeasibilityEngine;
use solver_intents::{IntentCreateGate, IntentError, IntentValidator};
use solver_queue::{Job, JobError, JobHandler};
use solver_storage::IntentStore;
use solver_types::{
	utils::truncate_hash, ChainLog, EventBus, IntentEvent, IntentStatus, JobName, SolverEvent, B256,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct JobRouter {
	gate: Arc<IntentCreateGate>,
	validator: Arc<IntentValidator>,
	fee: Arc<FeeFeasibilityEngine>,
	store: Arc<dyn IntentStore>,
	sink: Arc<dyn FulfillmentSink>,
	event_bus: EventBus,
}

impl JobRouter {
	pub fn new(
		gate: Arc<IntentCreateGate>,
		validator: Arc<IntentValidator>,
		fee: Arc<FeeFeasibilityEngine>,
		store: Arc<dyn IntentStore>,
		sink: Arc<dyn FulfillmentSink>,
		event_bus: EventBus,
	) -> Self {
		Self {
			gate,
			validator,
			fee,
			store,
			sink,
			event_bus,
		}
	}

	async fn create(&self, job: &Job) -> Result<(), JobError> {
		let log: ChainLog = match job.decode_payload() {
			Ok(log) => log,
			Err(e) => {
				error!(job_id = %job.id, "Malformed create_intent payload: {}", e);
				return Ok(());
			}
		};
		let outcome = self.gate.create_intent(log).await;
		debug!(job_id = %job.id, ?outcome, "Create job finished");
		Ok(())
	}

	async fn validate(&self, job: &Job) -> Result<(), JobError> {
		let hash = intent_hash(job)?;
		match self.validator.validate_intent(&hash).await {
			Ok(_) => Ok(()),
			Err(e @ IntentError::DestructureFailed(_)) => Err(JobError::fatal(e.to_string())),
			Err(e) => Err(JobError::retryable(e.to_string())),
		}
	}

	async fn feasible(&self, job: &Job) -> Result<(), JobError> {
		let hash = intent_hash(job)?;
		let short = truncate_hash(&hash.to_string());
		let record = self
			.store
			.find_by_hash(&hash)
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?
			.ok_or_else(|| JobError::fatal(format!("No record for intent {}", hash)))?;

		match self.fee.is_route_feasible(&record.intent).await {
			Ok(()) => self
				.sink
				.fulfill(&record)
				.await
				.map_err(|e| JobError::retryable(e.to_string())),
			Err(e) if e.is_rejection() => {
				warn!(intent_hash = %short, "Intent is infeasible: {}", e);
				self.store
					.update_status(&hash, IntentStatus::Infeasable, None)
					.await
					.map_err(|e| JobError::retryable(e.to_string()))?;
				self.event_bus
					.publish(SolverEvent::Intent(IntentEvent::Infeasible {
						intent_hash: hash,
						reason: e.to_string(),
					}));
				Ok(())
			}
			Err(e) if e.is_configuration() => {
				error!(intent_hash = %short, "Feasibility check misconfigured: {}", e);
				Err(JobError::fatal(e.to_string()))
			}
			Err(e) => Err(JobError::retryable(e.to_string())),
		}
	}
}

fn intent_hash(job: &Job) -> Result<B256, JobError> {
	job.decode_payload()
		.map_err(|e| JobError::fatal(format!("Malformed {} payload: {}", job.name, e)))
}

#[async_trait]
impl JobHandler for JobRouter {
	async fn handle(&self, job: &Job) -> Result<(), JobError> {
		match job.name {
			JobName::CreateIntent => self.create(job).await,
			JobName::ValidateIntent => self.validate(job).await,
			JobName::FeasableIntent => self.feasible(job).await,
		}
	}
}

//! Job queue used between pipeline stages.
//!
//! Producers submit jobs under caller-chosen ids. An id that was already
//! submitted is ignored, which is what makes redelivered chain events and
//! re-scanned blocks harmless. Consumers register a single [`JobHandler`]
//! that receives every job; handler failures flagged as retryable are
//! redelivered with backoff.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use solver_types::JobName;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod memory;
}

pub use implementations::memory::MemoryQueue;

#[derive(Debug, Error)]
pub enum QueueError {
	#[error("Queue is closed")]
	Closed,
	#[error("Queue already started")]
	AlreadyStarted,
	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// A unit of work delivered to the [`JobHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
	pub name: JobName,
	pub id: String,
	pub payload: serde_json::Value,
	/// Deliveries before this one.
	pub attempts_made: u32,
}

impl Job {
	pub fn new(name: JobName, id: impl Into<String>, payload: serde_json::Value) -> Self {
		Self {
			name,
			id: id.into(),
			payload,
			attempts_made: 0,
		}
	}

	pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
		serde_json::from_value(self.payload.clone())
			.map_err(|e| QueueError::Serialization(e.to_string()))
	}
}

/// Serializes a job payload. Integer fields carry their own `$bigint` tags.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<serde_json::Value, QueueError> {
	serde_json::to_value(payload).map_err(|e| QueueError::Serialization(e.to_string()))
}

/// Failure of one job execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct JobError {
	pub message: String,
	/// Whether the queue should deliver the job again.
	pub retryable: bool,
}

impl JobError {
	pub fn retryable(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			retryable: true,
		}
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			retryable: false,
		}
	}
}

#[async_trait]
pub trait JobHandler: Send + Sync {
	async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Submits a job. Returns `false` when a job with `job_id` was already
	/// submitted, in which case nothing is enqueued.
	async fn add(
		&self,
		name: JobName,
		job_id: String,
		payload: serde_json::Value,
	) -> Result<bool, QueueError>;

	/// Starts delivering jobs to `handler`.
	async fn start(&self, handler: Arc<dyn JobHandler>) -> Result<(), QueueError>;

	/// Stops accepting jobs and waits for running handlers to finish.
	async fn close(&self) -> Result<(), QueueError>;
}

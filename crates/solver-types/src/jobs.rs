//! Job names and idempotency keys shared by producers and consumers.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Jobs handled by the intent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
	/// Payload: a stamped [`crate::ChainLog`].
	CreateIntent,
	/// Payload: the intent hash.
	ValidateIntent,
	/// Payload: the intent hash.
	FeasableIntent,
}

impl JobName {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobName::CreateIntent => "create_intent",
			JobName::ValidateIntent => "validate_intent",
			JobName::FeasableIntent => "feasable_intent",
		}
	}
}

impl fmt::Display for JobName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The step that produced a job, used as the idempotency key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOperation {
	/// `create_intent` jobs submitted by the watcher and gap sync.
	Create,
	/// `validate_intent` jobs submitted by the admission gate.
	Validate,
	/// `feasable_intent` jobs submitted by the validator.
	Feasible,
}

impl JobOperation {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobOperation::Create => "create",
			JobOperation::Validate => "validate",
			JobOperation::Feasible => "feasible",
		}
	}
}

/// Deterministic job id: `"{operation}-{intentHash}-{logIndex}"`.
pub fn intent_job_id(operation: JobOperation, intent_hash: &B256, log_index: u64) -> String {
	format!("{}-{}-{}", operation.as_str(), intent_hash, log_index)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_job_id_format() {
		let hash = B256::repeat_byte(0xab);
		assert_eq!(
			intent_job_id(JobOperation::Create, &hash, 2),
			format!("create-0x{}-2", "ab".repeat(32))
		);
		assert!(intent_job_id(JobOperation::Validate, &hash, 0).starts_with("validate-0xabab"));
		assert_ne!(
			intent_job_id(JobOperation::Validate, &hash, 0),
			intent_job_id(JobOperation::Feasible, &hash, 0)
		);
	}

	#[test]
	fn test_job_names() {
		assert_eq!(
			serde_json::to_string(&JobName::FeasableIntent).unwrap(),
			"\"feasable_intent\""
		);
		assert_eq!(JobName::CreateIntent.to_string(), "create_intent");
	}
}

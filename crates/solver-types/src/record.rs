//! Persisted intent records and their lifecycle.

use crate::intent::Intent;
use crate::log::ChainLog;
use crate::validation::ValidationChecks;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an intent record.
///
/// Records move forward only: `PENDING` first, then one of the rejection
/// states, then the fulfillment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentStatus {
	#[serde(rename = "PENDING")]
	Pending,
	#[serde(rename = "NON-BEND-WALLET")]
	NonBendWallet,
	#[serde(rename = "INVALID")]
	Invalid,
	#[serde(rename = "INFEASABLE")]
	Infeasable,
	#[serde(rename = "SOLVED")]
	Solved,
	#[serde(rename = "EXPIRED")]
	Expired,
	#[serde(rename = "FAILED")]
	Failed,
}

impl IntentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			IntentStatus::Pending => "PENDING",
			IntentStatus::NonBendWallet => "NON-BEND-WALLET",
			IntentStatus::Invalid => "INVALID",
			IntentStatus::Infeasable => "INFEASABLE",
			IntentStatus::Solved => "SOLVED",
			IntentStatus::Expired => "EXPIRED",
			IntentStatus::Failed => "FAILED",
		}
	}

	fn stage(&self) -> u8 {
		match self {
			IntentStatus::Pending => 0,
			IntentStatus::NonBendWallet | IntentStatus::Invalid | IntentStatus::Infeasable => 1,
			IntentStatus::Solved | IntentStatus::Expired | IntentStatus::Failed => 2,
		}
	}

	/// Whether a record in this status may be moved to `next`.
	///
	/// Rewriting the current status is allowed so retried writes stay idempotent.
	pub fn can_transition_to(&self, next: IntentStatus) -> bool {
		*self == next || next.stage() > self.stage()
	}
}

impl fmt::Display for IntentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The durable wrapper around an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
	/// The log that produced the intent; absent for gasless initiations.
	pub event: Option<ChainLog>,
	pub intent: Intent,
	/// Fulfillment receipt, written by the fulfillment stage.
	pub receipt: Option<serde_json::Value>,
	pub status: IntentStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validations: Option<ValidationChecks>,
}

impl IntentRecord {
	pub fn new(event: Option<ChainLog>, intent: Intent, status: IntentStatus) -> Self {
		Self {
			event,
			intent,
			receipt: None,
			status,
			validations: None,
		}
	}

	/// Block the producing log was included in, if known.
	pub fn block_number(&self) -> Option<u64> {
		self.event.as_ref().and_then(|e| e.block_number)
	}
}

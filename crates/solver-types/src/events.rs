//! Lifecycle events published by pipeline components.

use crate::record::IntentStatus;
use crate::ChainId;
use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SolverEvent {
	Discovery(DiscoveryEvent),
	Intent(IntentEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoveryEvent {
	/// A batch of logs was turned into `create_intent` jobs.
	LogsQueued { chain_id: ChainId, count: usize },
	/// An observed log could not be handed to the queue.
	JobSubmissionFailed {
		chain_id: ChainId,
		job_id: String,
		error: String,
	},
	SubscriptionRecovered { chain_id: ChainId },
	GapSynced {
		chain_id: ChainId,
		from_block: u64,
		to_block: u64,
		count: usize,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntentEvent {
	Admitted { intent_hash: B256, status: IntentStatus },
	Invalid { intent_hash: B256, failed: Vec<String> },
	Validated { intent_hash: B256 },
	Feasible { intent_hash: B256 },
	Infeasible { intent_hash: B256, reason: String },
}

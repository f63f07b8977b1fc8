//! Hand-off of feasible intents to fulfillment.

use crate::CoreError;
use async_trait::async_trait;
use solver_types::{utils::truncate_hash, EventBus, IntentEvent, IntentRecord, SolverEvent};
use tracing::info;

/// Receives every intent that passed the feasibility check.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FulfillmentSink: Send + Sync {
	async fn fulfill(&self, record: &IntentRecord) -> Result<(), CoreError>;
}

/// Logs the intent and publishes [`IntentEvent::Feasible`].
pub struct LoggingFulfillmentSink {
	event_bus: EventBus,
}

impl LoggingFulfillmentSink {
	pub fn new(event_bus: EventBus) -> Self {
		Self { event_bus }
	}
}

#[async_trait]
impl FulfillmentSink for LoggingFulfillmentSink {
	async fn fulfill(&self, record: &IntentRecord) -> Result<(), CoreError> {
		let intent = &record.intent;
		info!(
			intent_hash = %truncate_hash(&intent.hash.to_string()),
			source = intent.route.source,
			destination = intent.route.destination,
			"Intent is feasible"
		);
		self.event_bus.publish(SolverEvent::Intent(IntentEvent::Feasible {
			intent_hash: intent.hash,
		}));
		Ok(())
	}
}

//! Broadcast channel carrying [`SolverEvent`]s between components.

use crate::events::SolverEvent;
use tokio::sync::broadcast;

/// Cloneable handle to a broadcast channel of solver events.
///
/// Publishing never blocks; slow subscribers miss the oldest events once the
/// channel capacity is exceeded.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<SolverEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SolverEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Having no subscribers is not an error here.
	pub fn publish(&self, event: SolverEvent) {
		let _ = self.sender.send(event);
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}

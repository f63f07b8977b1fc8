//! Intent discovery on source chains.
//!
//! [`ChainWatcher`] keeps one live `IntentCreated` subscription per intent
//! source and turns every observed log into a `create_intent` job.
//! [`ChainGapSync`] runs at startup and replays, through the same job path,
//! the logs emitted since the last block recorded in the intent store.

use solver_chains::ChainError;
use solver_queue::QueueError;
use solver_storage::StorageError;
use solver_types::ChainId;
use thiserror::Error;

pub mod gap_sync;
pub mod watcher;

pub use gap_sync::{ChainGapSync, SyncReport, SyncSummary};
pub use watcher::ChainWatcher;

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Failed to subscribe to chains {0:?}")]
	Subscribe(Vec<ChainId>),
	#[error("No subscription found for chains {0:?}")]
	Unsubscribe(Vec<ChainId>),
	#[error("Failed to sync chains {0:?}")]
	Sync(Vec<ChainId>),
}

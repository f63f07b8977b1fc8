//! Intent admission.
//!
//! [`IntentCreateGate`] turns observed `IntentCreated` logs into stored
//! records exactly once and queues trusted ones for validation.
//! [`IntentValidator`] runs the structural checks and the funding check and
//! either marks the record invalid or queues it for the feasibility stage.

use solver_chains::ChainError;
use solver_fee::FeeError;
use solver_queue::QueueError;
use solver_storage::StorageError;
use solver_types::{DecodeError, B256};
use thiserror::Error;

pub mod create;
pub mod flags;
pub mod validate;
pub mod validation;
pub mod wallet;

pub use create::{CreateOutcome, IntentCreateGate};
pub use flags::{ConfigFlags, FeatureFlag, FeatureFlags};
pub use validate::{ExponentialDelay, IntentValidator, RetryDelay};
pub use validation::{ConfigValidation, ValidationInterface};
pub use wallet::{AllowListWalletValidator, SmartWalletValidator};

#[cfg(any(test, feature = "testing"))]
pub use flags::MockFeatureFlags;
#[cfg(any(test, feature = "testing"))]
pub use validation::MockValidationInterface;
#[cfg(any(test, feature = "testing"))]
pub use wallet::MockSmartWalletValidator;

#[derive(Debug, Error)]
pub enum IntentError {
	/// The record or the destination solver for a hash could not be found.
	#[error("Failed to destructure intent {0}")]
	DestructureFailed(B256),
	#[error("Decode error: {0}")]
	Decode(#[from] DecodeError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("Fee error: {0}")]
	Fee(#[from] FeeError),
}

//! Shared types for the intent admission pipeline.
//!
//! This crate holds the data model that flows between the chain watchers,
//! the job queue, the admission gate, the validator and the fee engine:
//! intents and their on-chain ABI bindings, persisted records, validation
//! results, job identifiers and the lifecycle event bus.

pub mod contracts;
pub mod decode;
pub mod event_bus;
pub mod events;
pub mod intent;
pub mod jobs;
pub mod log;
pub mod record;
pub mod serde_helpers;
pub mod utils;
pub mod validation;

pub use decode::{decode_create_intent_log, DecodeError, DecodedEvent};
pub use event_bus::EventBus;
pub use events::*;
pub use intent::*;
pub use jobs::*;
pub use log::ChainLog;
pub use record::*;
pub use validation::ValidationChecks;

pub use alloy::primitives::{Address, Bytes, B256, U256};

/// Numeric chain identifier.
pub type ChainId = u64;

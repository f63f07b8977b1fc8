//! Raw chain logs as carried through the job queue.

use crate::serde_helpers::bigint;
use crate::ChainId;
use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// A chain log stamped with the source it was observed on.
///
/// This is the payload of a `create_intent` job, so every integer field uses
/// the tagged bigint encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	#[serde(default, with = "bigint::option")]
	pub block_number: Option<u64>,
	#[serde(default)]
	pub block_hash: Option<B256>,
	#[serde(default)]
	pub transaction_hash: Option<B256>,
	#[serde(default, with = "bigint::option")]
	pub transaction_index: Option<u64>,
	#[serde(default, with = "bigint::option")]
	pub log_index: Option<u64>,
	#[serde(default)]
	pub removed: bool,
	#[serde(default, with = "bigint::option")]
	pub source_chain_id: Option<ChainId>,
	#[serde(default)]
	pub source_network: Option<String>,
}

impl ChainLog {
	/// Attaches the chain the log was read from.
	pub fn stamped(mut self, chain_id: ChainId, network: &str) -> Self {
		self.source_chain_id = Some(chain_id);
		self.source_network = Some(network.to_string());
		self
	}

	/// The indexed intent hash (first topic after the signature).
	pub fn intent_hash(&self) -> Option<B256> {
		self.topics.get(1).copied()
	}

	pub fn log_index_or_default(&self) -> u64 {
		self.log_index.unwrap_or_default()
	}
}

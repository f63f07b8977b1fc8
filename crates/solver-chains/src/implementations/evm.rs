//! Alloy-backed [`ChainClient`] over HTTP JSON-RPC.
//!
//! Subscriptions are implemented by polling: every interval the client reads
//! the chain head and fetches the `IntentCreated` logs of the blocks it has
//! not delivered yet, in pages of at most `max_block_range` blocks.

use crate::{
	block_ranges, ChainClient, ChainError, LogFilter, SubscriptionHandle, WatchEvent, WatchFilter,
};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use solver_types::contracts::IntentCreated;
use solver_types::{Address, Bytes, ChainId, ChainLog, B256};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const DEFAULT_MAX_BLOCK_RANGE: u64 = 10_000;

pub struct EvmChainClient {
	chain_id: ChainId,
	provider: DynProvider,
	poll_interval: Duration,
	max_block_range: u64,
}

impl EvmChainClient {
	pub fn new(chain_id: ChainId, rpc_url: &str, poll_interval: Duration) -> Result<Self, ChainError> {
		let url = rpc_url
			.parse()
			.map_err(|e| ChainError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
		let provider = ProviderBuilder::new().connect_http(url).erased();

		Ok(Self {
			chain_id,
			provider,
			poll_interval,
			max_block_range: DEFAULT_MAX_BLOCK_RANGE,
		})
	}

	/// Caps the block span of each `eth_getLogs` request a subscription makes.
	pub fn with_max_block_range(mut self, max_block_range: u64) -> Self {
		self.max_block_range = max_block_range.max(1);
		self
	}

	#[allow(clippy::too_many_arguments)]
	async fn poll_loop(
		chain_id: ChainId,
		provider: DynProvider,
		filter: Filter,
		mut last_block: u64,
		poll_interval: Duration,
		max_block_range: u64,
		sink: mpsc::UnboundedSender<WatchEvent>,
		mut stop_rx: oneshot::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(poll_interval);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let poll = Self::poll_once(chain_id, &provider, &filter, last_block, max_block_range, &sink);
					match poll.await {
						Some(delivered) => last_block = delivered,
						None => break,
					}
				}
				_ = &mut stop_rx => {
					break;
				}
			}
		}

		debug!(chain_id, "Subscription closed");
	}

	/// Delivers the blocks after `last_block` up to the head, one capped page
	/// at a time. Returns the last block delivered, or `None` once the sink
	/// is gone.
	async fn poll_once(
		chain_id: ChainId,
		provider: &DynProvider,
		filter: &Filter,
		mut last_block: u64,
		max_block_range: u64,
		sink: &mpsc::UnboundedSender<WatchEvent>,
	) -> Option<u64> {
		let current = match provider.get_block_number().await {
			Ok(block) => block,
			Err(e) => {
				sink.send(WatchEvent::Error(ChainError::Rpc(e.to_string()))).ok()?;
				return Some(last_block);
			}
		};

		for (from, to) in block_ranges(last_block + 1, current, max_block_range) {
			let range = filter.clone().from_block(from).to_block(to);
			let logs = match provider.get_logs(&range).await {
				Ok(logs) => logs,
				Err(e) => {
					sink.send(WatchEvent::Error(ChainError::Rpc(e.to_string()))).ok()?;
					return Some(last_block);
				}
			};

			let logs: Vec<ChainLog> = logs.into_iter().map(to_chain_log).collect();
			if !logs.is_empty() {
				debug!(chain_id, count = logs.len(), to_block = to, "Observed intent logs");
			}
			sink.send(WatchEvent::Logs { logs, to_block: to }).ok()?;
			last_block = to;
		}
		Some(last_block)
	}
}

#[async_trait]
impl ChainClient for EvmChainClient {
	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, ChainError> {
		let query = intent_created_filter(filter.address, &filter.provers)
			.from_block(filter.from_block)
			.to_block(filter.to_block);
		let logs = self
			.provider
			.get_logs(&query)
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))?;
		Ok(logs.into_iter().map(to_chain_log).collect())
	}

	async fn watch_logs(
		&self,
		filter: WatchFilter,
		sink: mpsc::UnboundedSender<WatchEvent>,
	) -> Result<SubscriptionHandle, ChainError> {
		let last_block = match filter.from_block {
			Some(block) => block.saturating_sub(1),
			None => self.block_number().await?,
		};
		if self.poll_interval.is_zero() {
			warn!(chain_id = self.chain_id, "Zero poll interval configured");
		}

		let (stop_tx, stop_rx) = oneshot::channel();
		tokio::spawn(Self::poll_loop(
			self.chain_id,
			self.provider.clone(),
			intent_created_filter(filter.address, &filter.provers),
			last_block,
			self.poll_interval.max(Duration::from_millis(100)),
			self.max_block_range,
			sink,
			stop_rx,
		));

		Ok(SubscriptionHandle::new(stop_tx))
	}

	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
		let request = TransactionRequest::default().to(to).input(data.into());
		self.provider.call(request).await.map_err(|e| {
			let reverted = e
				.as_error_resp()
				.is_some_and(|payload| is_revert(payload.code, &payload.message));
			if reverted {
				ChainError::Reverted(e.to_string())
			} else {
				ChainError::Rpc(e.to_string())
			}
		})
	}
}

/// `IntentCreated` logs from `address`, restricted to `provers` when given.
pub fn intent_created_filter(address: Address, provers: &[Address]) -> Filter {
	let filter = Filter::new()
		.address(address)
		.event_signature(IntentCreated::SIGNATURE_HASH);
	if provers.is_empty() {
		return filter;
	}
	filter.topic3(provers.iter().map(|p| p.into_word()).collect::<Vec<B256>>())
}

/// JSON-RPC error code 3 is the standard execution-reverted code. Some nodes
/// answer with a generic code and only say so in the message.
fn is_revert(code: i64, message: &str) -> bool {
	code == 3 || message.contains("execution reverted")
}

pub fn to_chain_log(log: Log) -> ChainLog {
	ChainLog {
		address: log.address(),
		topics: log.topics().to_vec(),
		data: log.data().data.clone(),
		block_number: log.block_number,
		block_hash: log.block_hash,
		transaction_hash: log.transaction_hash,
		transaction_index: log.transaction_index,
		log_index: log.log_index,
		removed: log.removed,
		source_chain_id: None,
		source_network: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Log as PrimitiveLog, LogData};

	#[test]
	fn test_filter_restricts_provers_on_third_topic() {
		let prover = Address::repeat_byte(0xd1);
		let filter = intent_created_filter(Address::repeat_byte(0xa0), &[prover]);

		assert!(filter.topics[0].matches(&IntentCreated::SIGNATURE_HASH));
		assert!(filter.topics[3].matches(&prover.into_word()));
		assert!(!filter.topics[3].matches(&Address::repeat_byte(0xd2).into_word()));

		let open = intent_created_filter(Address::repeat_byte(0xa0), &[]);
		assert!(open.topics[3].is_empty());
	}

	#[test]
	fn test_rpc_log_conversion_keeps_metadata() {
		let topics = vec![IntentCreated::SIGNATURE_HASH, B256::repeat_byte(1)];
		let log = Log {
			inner: PrimitiveLog {
				address: Address::repeat_byte(0xa0),
				data: LogData::new_unchecked(topics.clone(), Bytes::from(vec![7, 7])),
			},
			block_hash: Some(B256::repeat_byte(2)),
			block_number: Some(55),
			block_timestamp: None,
			transaction_hash: Some(B256::repeat_byte(3)),
			transaction_index: Some(4),
			log_index: Some(5),
			removed: false,
		};

		let converted = to_chain_log(log);
		assert_eq!(converted.address, Address::repeat_byte(0xa0));
		assert_eq!(converted.topics, topics);
		assert_eq!(converted.data, Bytes::from(vec![7, 7]));
		assert_eq!(converted.block_number, Some(55));
		assert_eq!(converted.log_index, Some(5));
		assert_eq!(converted.intent_hash(), Some(B256::repeat_byte(1)));
		assert!(converted.source_chain_id.is_none());
	}

	#[test]
	fn test_revert_detection() {
		assert!(is_revert(3, "execution reverted: ERC20: bad"));
		assert!(is_revert(-32000, "execution reverted"));
		assert!(!is_revert(-32005, "limit exceeded"));
		assert!(!is_revert(-32603, "internal error"));
	}

	#[test]
	fn test_rejects_malformed_rpc_url() {
		assert!(matches!(
			EvmChainClient::new(1, "not a url", Duration::from_secs(1)),
			Err(ChainError::Config(_))
		));
	}
}

//! Chain access for the intent pipeline.
//!
//! [`ChainClient`] is the narrow contract the pipeline needs from an
//! EVM-compatible chain: current height, historical logs, a live log
//! subscription and read-only calls. [`ChainRegistry`] maps chain ids to
//! clients, and [`contracts`] wraps the typed contract reads built on
//! [`ChainClient::call`].

use async_trait::async_trait;
use solver_types::{Address, Bytes, ChainId, ChainLog};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub mod contracts;
pub mod registry;

pub mod implementations {
	pub mod evm;
}

pub use registry::ChainRegistry;

#[derive(Debug, Error, Clone)]
pub enum ChainError {
	#[error("RPC error: {0}")]
	Rpc(String),
	/// The node executed the call and it reverted. Repeating it gives the same answer.
	#[error("Call reverted: {0}")]
	Reverted(String),
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Chain {0} is not configured")]
	NotConfigured(ChainId),
	#[error("Configuration error: {0}")]
	Config(String),
}

/// `IntentCreated` logs from one intent source over a closed block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub address: Address,
	/// Empty means any prover.
	pub provers: Vec<Address>,
	pub from_block: u64,
	pub to_block: u64,
}

/// A live `IntentCreated` subscription on one intent source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFilter {
	pub address: Address,
	pub provers: Vec<Address>,
	/// First block to deliver; the current head when unset.
	pub from_block: Option<u64>,
}

/// Delivered on a subscription's sink.
#[derive(Debug, Clone)]
pub enum WatchEvent {
	/// Logs found up to and including `to_block`, in chain order. May be empty.
	Logs { logs: Vec<ChainLog>, to_block: u64 },
	/// A transport failure. The subscription keeps running.
	Error(ChainError),
}

/// Handle owning a live subscription. Closing it stops delivery.
#[derive(Debug)]
pub struct SubscriptionHandle {
	stop: oneshot::Sender<()>,
}

impl SubscriptionHandle {
	pub fn new(stop: oneshot::Sender<()>) -> Self {
		Self { stop }
	}

	pub fn close(self) {
		let _ = self.stop.send(());
	}
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
	fn chain_id(&self) -> ChainId;

	async fn block_number(&self) -> Result<u64, ChainError>;

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, ChainError>;

	/// Starts delivering matching logs to `sink` until the handle is closed.
	async fn watch_logs(
		&self,
		filter: WatchFilter,
		sink: mpsc::UnboundedSender<WatchEvent>,
	) -> Result<SubscriptionHandle, ChainError>;

	/// Read-only call returning raw return data.
	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;
}

/// Splits `from..=to` into consecutive closed ranges of at most `max_range`
/// blocks. Empty when `from > to`.
pub fn block_ranges(from: u64, to: u64, max_range: u64) -> impl Iterator<Item = (u64, u64)> {
	let step = max_range.max(1);
	let mut next = Some(from).filter(|start| *start <= to);
	std::iter::from_fn(move || {
		let start = next?;
		let end = start.saturating_add(step - 1).min(to);
		next = end.checked_add(1).filter(|n| *n <= to);
		Some((start, end))
	})
}

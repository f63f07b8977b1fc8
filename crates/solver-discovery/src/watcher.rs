use crate::DiscoveryError;
use backoff::{backoff::Backoff, ExponentialBackoff};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use solver_chains::{ChainError, ChainRegistry, SubscriptionHandle, WatchEvent, WatchFilter};
use solver_config::{IntentSourceConfig, WatchConfig};
use solver_queue::{encode_payload, QueueInterface};
use solver_types::{
	intent_job_id, utils::truncate_hash, ChainId, ChainLog, DiscoveryEvent, EventBus, JobName,
	JobOperation, SolverEvent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Resubscription backoff for one chain.
struct RecoveryState {
	backoff: ExponentialBackoff,
	last_recovered: Option<Instant>,
}

/// Live `IntentCreated` subscriptions, one per intent source.
///
/// Logs of one source are handled in delivery order by a single consumer
/// task. Sources never share a task, so a slow or failing chain does not
/// hold up the others.
pub struct ChainWatcher {
	chains: Arc<ChainRegistry>,
	queue: Arc<dyn QueueInterface>,
	event_bus: EventBus,
	recovery: WatchConfig,
	sources: DashMap<ChainId, IntentSourceConfig>,
	subscriptions: DashMap<ChainId, SubscriptionHandle>,
	/// Last block delivered per chain.
	cursors: DashMap<ChainId, u64>,
	recovering: DashSet<ChainId>,
	recovery_state: DashMap<ChainId, RecoveryState>,
	stopped: AtomicBool,
}

impl ChainWatcher {
	pub fn new(
		chains: Arc<ChainRegistry>,
		queue: Arc<dyn QueueInterface>,
		event_bus: EventBus,
		recovery: WatchConfig,
	) -> Self {
		Self {
			chains,
			queue,
			event_bus,
			recovery,
			sources: DashMap::new(),
			subscriptions: DashMap::new(),
			cursors: DashMap::new(),
			recovering: DashSet::new(),
			recovery_state: DashMap::new(),
			stopped: AtomicBool::new(false),
		}
	}

	/// Opens a subscription for every source concurrently. A chain listed in
	/// `from_blocks` is watched from that block, any other from its head. A
	/// source that fails to subscribe does not stop the others; the failed
	/// chains are reported together once all attempts have finished.
	pub async fn subscribe(
		self: &Arc<Self>,
		sources: &[IntentSourceConfig],
		from_blocks: &HashMap<ChainId, u64>,
	) -> Result<(), DiscoveryError> {
		self.stopped.store(false, Ordering::SeqCst);

		let results = join_all(sources.iter().map(|source| async move {
			let from_block = from_blocks.get(&source.chain_id).copied();
			(source.chain_id, self.subscribe_to(source, from_block).await)
		}))
		.await;

		let mut failed = Vec::new();
		for (chain_id, result) in results {
			if let Err(e) = result {
				error!(chain_id, "Failed to subscribe to intent source: {}", e);
				failed.push(chain_id);
			}
		}

		if failed.is_empty() {
			Ok(())
		} else {
			Err(DiscoveryError::Subscribe(failed))
		}
	}

	/// Subscribes to a single source, starting at `from_block` or the head.
	pub async fn subscribe_to(
		self: &Arc<Self>,
		source: &IntentSourceConfig,
		from_block: Option<u64>,
	) -> Result<(), DiscoveryError> {
		let chain_id = source.chain_id;
		let client = self.chains.get_required(chain_id)?;

		let (sink, events) = mpsc::unbounded_channel();
		let handle = client
			.watch_logs(
				WatchFilter {
					address: source.source_address,
					provers: source.provers.clone(),
					from_block,
				},
				sink,
			)
			.await?;

		self.sources.insert(chain_id, source.clone());
		if let Some(block) = from_block {
			self.cursors.insert(chain_id, block.saturating_sub(1));
		}
		if let Some(previous) = self.subscriptions.insert(chain_id, handle) {
			previous.close();
		}

		info!(
			chain_id,
			network = %source.network,
			address = %source.source_address,
			from_block = ?from_block,
			"Watching intent source"
		);

		let watcher = Arc::clone(self);
		let source = source.clone();
		tokio::spawn(async move { watcher.consume(source, events).await });
		Ok(())
	}

	/// Closes every open subscription. Chains with no open subscription are
	/// logged and reported after the rest have been closed.
	pub async fn unsubscribe(&self) -> Result<(), DiscoveryError> {
		self.stopped.store(true, Ordering::SeqCst);

		let mut chains: Vec<ChainId> = self.sources.iter().map(|s| *s.key()).collect();
		chains.sort_unstable();

		let mut missing = Vec::new();
		for chain_id in chains {
			if self.unsubscribe_from(chain_id).await.is_err() {
				missing.push(chain_id);
			}
		}

		if missing.is_empty() {
			info!("Closed all intent source subscriptions");
			Ok(())
		} else {
			Err(DiscoveryError::Unsubscribe(missing))
		}
	}

	pub async fn unsubscribe_from(&self, chain_id: ChainId) -> Result<(), DiscoveryError> {
		match self.subscriptions.remove(&chain_id) {
			Some((_, handle)) => {
				handle.close();
				debug!(chain_id, "Closed intent source subscription");
				Ok(())
			}
			None => {
				warn!(chain_id, "No unsubscribe handler found");
				Err(DiscoveryError::Unsubscribe(vec![chain_id]))
			}
		}
	}

	/// Stamps each log with its source and submits one `create_intent` job
	/// per log. Returns how many jobs the queue accepted as new.
	pub async fn add_job(
		&self,
		source: &IntentSourceConfig,
		logs: Vec<ChainLog>,
	) -> Result<usize, DiscoveryError> {
		let mut queued = 0;
		for log in logs {
			let log = log.stamped(source.chain_id, &source.network);
			let Some(intent_hash) = log.intent_hash() else {
				warn!(chain_id = source.chain_id, "Skipping log without intent hash topic");
				continue;
			};

			let job_id = intent_job_id(JobOperation::Create, &intent_hash, log.log_index_or_default());
			let payload = encode_payload(&log)?;
			match self.queue.add(JobName::CreateIntent, job_id.clone(), payload).await {
				Ok(true) => queued += 1,
				Ok(false) => {
					debug!(job_id = %job_id, "Create job already submitted");
				}
				Err(e) => {
					self.event_bus
						.publish(SolverEvent::Discovery(DiscoveryEvent::JobSubmissionFailed {
							chain_id: source.chain_id,
							job_id,
							error: e.to_string(),
						}));
					return Err(e.into());
				}
			}
		}

		if queued > 0 {
			info!(chain_id = source.chain_id, count = queued, "Queued intent creation jobs");
			self.event_bus
				.publish(SolverEvent::Discovery(DiscoveryEvent::LogsQueued {
					chain_id: source.chain_id,
					count: queued,
				}));
		}
		Ok(queued)
	}

	async fn consume(
		self: Arc<Self>,
		source: IntentSourceConfig,
		mut events: mpsc::UnboundedReceiver<WatchEvent>,
	) {
		let chain_id = source.chain_id;
		while let Some(event) = events.recv().await {
			match event {
				WatchEvent::Logs { logs, to_block } => {
					let first = logs
						.first()
						.and_then(|l| l.intent_hash())
						.map(|h| truncate_hash(&h.to_string()));
					let count = logs.len();
					match self.add_job(&source, logs).await {
						Ok(_) => {
							self.cursors.insert(chain_id, to_block);
						}
						Err(e) => {
							error!(
								chain_id,
								count,
								first_intent = ?first,
								"Failed to queue observed intents: {}",
								e
							);
						}
					}
				}
				WatchEvent::Error(e) => {
					if self.recovering.insert(chain_id) {
						let watcher = Arc::clone(&self);
						let source = source.clone();
						tokio::spawn(async move { watcher.recover(source, e).await });
					} else {
						debug!(chain_id, "Recovery already in progress: {}", e);
					}
				}
			}
		}
		debug!(chain_id, "Subscription consumer finished");
	}

	/// Tears the chain's subscription down and opens a new one from the
	/// block after the last delivered one, retrying until it succeeds or
	/// the watcher is stopped.
	fn recover(
		self: Arc<Self>,
		source: IntentSourceConfig,
		cause: ChainError,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
		Box::pin(async move {
		let chain_id = source.chain_id;
		warn!(chain_id, "Intent source subscription failed: {}", cause);

		while !self.stopped.load(Ordering::SeqCst) {
			let delay = self.next_recovery_delay(chain_id);
			debug!(chain_id, delay_ms = delay.as_millis() as u64, "Resubscribing");
			tokio::time::sleep(delay).await;
			if self.stopped.load(Ordering::SeqCst) {
				break;
			}

			let from_block = self.cursors.get(&chain_id).map(|c| *c + 1);
			if let Some((_, handle)) = self.subscriptions.remove(&chain_id) {
				handle.close();
			}

			match self.subscribe_to(&source, from_block).await {
				Ok(()) => {
					info!(chain_id, from_block = ?from_block, "Intent source subscription recovered");
					self.event_bus
						.publish(SolverEvent::Discovery(DiscoveryEvent::SubscriptionRecovered {
							chain_id,
						}));
					break;
				}
				Err(e) => {
					error!(chain_id, "Resubscription failed: {}", e);
				}
			}
		}

		self.recovering.remove(&chain_id);
		})
	}

	fn next_recovery_delay(&self, chain_id: ChainId) -> Duration {
		let window = Duration::from_millis(self.recovery.recovery_stability_window_ms);
		let mut state = self
			.recovery_state
			.entry(chain_id)
			.or_insert_with(|| RecoveryState {
				backoff: recovery_backoff(&self.recovery),
				last_recovered: None,
			});

		if state.last_recovered.is_some_and(|at| at.elapsed() >= window) {
			state.backoff.reset();
		}
		state.last_recovered = Some(Instant::now());

		let max = Duration::from_millis(self.recovery.recovery_backoff_max_ms);
		state.backoff.next_backoff().unwrap_or(max).min(max)
	}
}

fn recovery_backoff(config: &WatchConfig) -> ExponentialBackoff {
	ExponentialBackoff {
		current_interval: Duration::from_millis(config.recovery_backoff_base_ms),
		initial_interval: Duration::from_millis(config.recovery_backoff_base_ms),
		randomization_factor: 0.0,
		multiplier: 2.0,
		max_interval: Duration::from_millis(config.recovery_backoff_max_ms),
		max_elapsed_time: None,
		..Default::default()
	}
}

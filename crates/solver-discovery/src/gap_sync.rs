use crate::{ChainWatcher, DiscoveryError};
use futures::future::join_all;
use solver_chains::{block_ranges, ChainRegistry, LogFilter};
use solver_config::{ChainSyncConfig, IntentSourceConfig};
use solver_storage::IntentStore;
use solver_types::{decode_create_intent_log, ChainId, ChainLog, DiscoveryEvent, EventBus, SolverEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one source's startup scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
	pub chain_id: ChainId,
	pub from_block: u64,
	pub to_block: u64,
	/// Logs returned by the chain for the range.
	pub found: usize,
	/// Jobs the queue accepted as new.
	pub queued: usize,
}

/// Result of [`ChainGapSync::sync_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
	pub reports: Vec<SyncReport>,
	pub failed: Vec<ChainId>,
}

impl SyncSummary {
	pub fn queued(&self) -> usize {
		self.reports.iter().map(|r| r.queued).sum()
	}

	/// First block a live subscription must deliver for each synced chain,
	/// so nothing between the scanned head and the subscription is skipped.
	pub fn resume_blocks(&self) -> HashMap<ChainId, u64> {
		self.reports
			.iter()
			.map(|r| (r.chain_id, r.to_block + 1))
			.collect()
	}

	pub fn into_result(self) -> Result<Vec<SyncReport>, DiscoveryError> {
		if self.failed.is_empty() {
			Ok(self.reports)
		} else {
			Err(DiscoveryError::Sync(self.failed))
		}
	}
}

/// Replays intent logs missed while no subscription was running.
///
/// For each source the scan starts right after the highest block recorded
/// in the intent store and ends at the chain head. Logs go through
/// [`ChainWatcher::add_job`], so a log seen by both the scan and a live
/// subscription still yields a single job.
pub struct ChainGapSync {
	chains: Arc<ChainRegistry>,
	store: Arc<dyn IntentStore>,
	watcher: Arc<ChainWatcher>,
	event_bus: EventBus,
	config: ChainSyncConfig,
	destinations: HashSet<ChainId>,
}

impl ChainGapSync {
	pub fn new(
		chains: Arc<ChainRegistry>,
		store: Arc<dyn IntentStore>,
		watcher: Arc<ChainWatcher>,
		event_bus: EventBus,
		config: ChainSyncConfig,
		destinations: impl IntoIterator<Item = ChainId>,
	) -> Self {
		Self {
			chains,
			store,
			watcher,
			event_bus,
			config,
			destinations: destinations.into_iter().collect(),
		}
	}

	/// Syncs every source concurrently. A chain that fails is logged and
	/// listed in the summary; the others are unaffected.
	pub async fn sync_all(&self, sources: &[IntentSourceConfig]) -> SyncSummary {
		let results = join_all(sources.iter().map(|source| async move {
			(source.chain_id, self.sync_source(source).await)
		}))
		.await;

		let mut summary = SyncSummary::default();
		for (chain_id, result) in results {
			match result {
				Ok(report) => summary.reports.push(report),
				Err(e) => {
					error!(chain_id, "Failed to sync missed intents: {}", e);
					summary.failed.push(chain_id);
				}
			}
		}
		summary
	}

	pub async fn sync_source(&self, source: &IntentSourceConfig) -> Result<SyncReport, DiscoveryError> {
		let chain_id = source.chain_id;
		let client = self.chains.get_required(chain_id)?;
		let head = client.block_number().await?;

		let from_block = match self.store.last_recorded(chain_id).await? {
			Some(recorded) => recorded.block_number + 1,
			None => self.config.default_start_block.unwrap_or(head),
		};

		let mut logs = Vec::new();
		for (start, end) in block_ranges(from_block, head, self.config.max_block_range) {
			let page = client
				.get_logs(&LogFilter {
					address: source.source_address,
					provers: source.provers.clone(),
					from_block: start,
					to_block: end,
				})
				.await?;
			logs.extend(page);
		}

		let found = logs.len();
		let logs = self.supported(chain_id, logs);
		if logs.is_empty() {
			info!(
				"No transactions found for source {} to sync from block {}",
				source.network, from_block
			);
		}
		let queued = self.watcher.add_job(source, logs).await?;

		info!(chain_id, from_block, to_block = head, found, queued, "Synced missed intents");
		self.event_bus
			.publish(SolverEvent::Discovery(DiscoveryEvent::GapSynced {
				chain_id,
				from_block,
				to_block: head,
				count: queued,
			}));

		Ok(SyncReport {
			chain_id,
			from_block,
			to_block: head,
			found,
			queued,
		})
	}

	/// Keeps logs whose destination chain has a configured solver.
	fn supported(&self, chain_id: ChainId, logs: Vec<ChainLog>) -> Vec<ChainLog> {
		logs.into_iter()
			.filter(|log| match decode_create_intent_log(&log.data, &log.topics) {
				Ok(decoded) => self.destinations.contains(&decoded.route.destination),
				Err(e) => {
					warn!(chain_id, "Dropping undecodable intent log: {}", e);
					false
				}
			})
			.collect()
	}
}

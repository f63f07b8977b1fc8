//! Wiring of the intent admission pipeline.
//!
//! [`SolverBuilder`] assembles storage, chain clients, the job queue and the
//! pipeline stages from a [`Config`]. [`SolverEngine`] runs them: it starts
//! the queue workers, replays missed blocks, opens the live subscriptions
//! and then follows the lifecycle events until it is shut down.

use solver_chains::implementations::evm::EvmChainClient;
use solver_chains::{ChainClient, ChainError, ChainRegistry};
use solver_config::Config;
use solver_discovery::{ChainGapSync, ChainWatcher, DiscoveryError};
use solver_fee::{BalanceInterface, FeeError, FeeFeasibilityEngine, OnChainBalances};
use solver_intents::{
	AllowListWalletValidator, ConfigFlags, ConfigValidation, IntentCreateGate, IntentError,
	IntentValidator, SmartWalletValidator,
};
use solver_queue::{MemoryQueue, QueueError, QueueInterface};
use solver_storage::{StorageError, StorageIntentStore, StorageInterface, StorageService};
use solver_types::{DiscoveryEvent, EventBus, IntentEvent, SolverEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

pub mod fulfillment;
pub mod handlers;

pub use fulfillment::{FulfillmentSink, LoggingFulfillmentSink};
#[cfg(any(test, feature = "testing"))]
pub use fulfillment::MockFulfillmentSink;
pub use handlers::JobRouter;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
	#[error("Discovery error: {0}")]
	Discovery(#[from] DiscoveryError),
	#[error("Intent error: {0}")]
	Intent(#[from] IntentError),
	#[error("Fee error: {0}")]
	Fee(#[from] FeeError),
}

pub struct SolverEngine {
	config: Config,
	queue: Arc<dyn QueueInterface>,
	watcher: Arc<ChainWatcher>,
	gap_sync: ChainGapSync,
	gate: Arc<IntentCreateGate>,
	router: Arc<JobRouter>,
	event_bus: EventBus,
}

impl SolverEngine {
	/// Starts the queue workers, replays the blocks missed since the last
	/// recorded intent and opens a subscription per intent source.
	///
	/// Chains that fail to sync or subscribe are logged; the others keep
	/// running.
	pub async fn start(&self) -> Result<(), CoreError> {
		self.queue.start(self.router.clone()).await?;

		let sources = &self.config.intent_sources;
		let summary = self.gap_sync.sync_all(sources).await;
		info!(chains = summary.reports.len(), queued = summary.queued(), "Gap sync finished");
		if !summary.failed.is_empty() {
			error!(failed = ?summary.failed, "Gap sync incomplete");
		}

		// Synced chains resume right after the scanned head; the rest start at theirs.
		if let Err(e) = self.watcher.subscribe(sources, &summary.resume_blocks()).await {
			error!("Subscriptions incomplete: {}", e);
		}
		info!(sources = sources.len(), "Solver started");
		Ok(())
	}

	/// Starts the engine and then logs lifecycle events. Only returns on a
	/// startup error.
	pub async fn run(&self) -> Result<(), CoreError> {
		let mut events = self.event_bus.subscribe();
		self.start().await?;

		loop {
			match events.recv().await {
				Ok(event) => log_event(&event),
				Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
				Err(RecvError::Closed) => return Ok(()),
			}
		}
	}

	/// Closes every subscription and drains the queue.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		info!("Shutting down solver");
		if let Err(e) = self.watcher.unsubscribe().await {
			warn!("Unsubscribe incomplete: {}", e);
		}
		self.queue.close().await?;
		Ok(())
	}

	/// Entry point for gaslessly initiated intents.
	pub fn gate(&self) -> &Arc<IntentCreateGate> {
		&self.gate
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}
}

fn log_event(event: &SolverEvent) {
	match event {
		SolverEvent::Discovery(DiscoveryEvent::JobSubmissionFailed {
			chain_id,
			job_id,
			error,
		}) => warn!(chain_id, %job_id, %error, "Job submission failed"),
		SolverEvent::Discovery(DiscoveryEvent::SubscriptionRecovered { chain_id }) => {
			info!(chain_id, "Subscription recovered")
		}
		SolverEvent::Discovery(DiscoveryEvent::GapSynced {
			chain_id,
			from_block,
			to_block,
			count,
		}) => info!(chain_id, from_block, to_block, count, "Gap synced"),
		SolverEvent::Discovery(DiscoveryEvent::LogsQueued { chain_id, count }) => {
			info!(chain_id, count, "Logs queued")
		}
		SolverEvent::Intent(IntentEvent::Infeasible { intent_hash, reason }) => {
			info!(%intent_hash, %reason, "Intent infeasible")
		}
		SolverEvent::Intent(event) => info!(?event, "Intent event"),
	}
}

type StorageFactory = Box<dyn Fn(&toml::Value) -> Box<dyn StorageInterface> + Send>;

/// Builds a [`SolverEngine`] from configuration.
///
/// Storage backends are chosen by name. Chain clients default to HTTP
/// polling clients for every configured network; clients passed in with
/// [`SolverBuilder::with_chain_client`] take precedence.
pub struct SolverBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	chain_clients: Vec<Arc<dyn ChainClient>>,
	queue: Option<Arc<dyn QueueInterface>>,
	wallets: Option<Arc<dyn SmartWalletValidator>>,
	sink: Option<Arc<dyn FulfillmentSink>>,
}

impl SolverBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			chain_clients: Vec::new(),
			queue: None,
			wallets: None,
			sink: None,
		}
		.with_storage_factory("memory", solver_storage::implementations::memory::create_storage)
		.with_storage_factory("file", solver_storage::implementations::file::create_storage)
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn StorageInterface> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_chain_client(mut self, client: Arc<dyn ChainClient>) -> Self {
		self.chain_clients.push(client);
		self
	}

	pub fn with_queue(mut self, queue: Arc<dyn QueueInterface>) -> Self {
		self.queue = Some(queue);
		self
	}

	pub fn with_wallet_validator(mut self, wallets: Arc<dyn SmartWalletValidator>) -> Self {
		self.wallets = Some(wallets);
		self
	}

	pub fn with_fulfillment_sink(mut self, sink: Arc<dyn FulfillmentSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	pub fn build(self) -> Result<SolverEngine, CoreError> {
		let config = self.config;

		let backend = config.storage.backend.as_str();
		let factory = self.storage_factories.get(backend).ok_or_else(|| {
			CoreError::Config(format!("Unknown storage backend: {}", backend))
		})?;
		let storage = Arc::new(StorageService::new(factory(&config.storage.config)));

		let mut registry = ChainRegistry::new();
		for client in self.chain_clients {
			registry.register(client)?;
		}
		for network in &config.networks {
			if registry.get(network.chain_id).is_some() {
				continue;
			}
			let client = EvmChainClient::new(
				network.chain_id,
				&network.rpc_url,
				Duration::from_millis(network.poll_interval_ms),
			)?
			.with_max_block_range(config.chain_sync.max_block_range);
			registry.register(Arc::new(client))?;
		}
		let chains = Arc::new(registry);

		let event_bus = EventBus::new(1000);
		let store = Arc::new(StorageIntentStore::new(storage));
		let queue: Arc<dyn QueueInterface> = match self.queue {
			Some(queue) => queue,
			None => Arc::new(MemoryQueue::new(config.queue.clone())),
		};

		let balances: Arc<dyn BalanceInterface> =
			Arc::new(OnChainBalances::new(chains.clone(), config.solver.address));
		let fee = Arc::new(FeeFeasibilityEngine::from_config(balances.clone(), &config));
		let validation = Arc::new(ConfigValidation::from_config(fee.clone(), balances, &config));

		let watcher = Arc::new(ChainWatcher::new(
			chains.clone(),
			queue.clone(),
			event_bus.clone(),
			config.watch.clone(),
		));
		let gap_sync = ChainGapSync::new(
			chains.clone(),
			store.clone(),
			watcher.clone(),
			event_bus.clone(),
			config.chain_sync.clone(),
			config.supported_chains(),
		);

		let wallets: Arc<dyn SmartWalletValidator> = match self.wallets {
			Some(wallets) => wallets,
			None => Arc::new(AllowListWalletValidator::new(config.wallets.allowed.clone())),
		};
		let gate = Arc::new(IntentCreateGate::new(
			store.clone(),
			queue.clone(),
			Arc::new(ConfigFlags::new(config.flags.clone())),
			wallets,
			event_bus.clone(),
		));
		let validator = Arc::new(IntentValidator::new(
			store.clone(),
			queue.clone(),
			validation,
			chains,
			config.intent_sources.clone(),
			config.solvers.clone(),
			&config.intents,
			event_bus.clone(),
		));

		let sink: Arc<dyn FulfillmentSink> = match self.sink {
			Some(sink) => sink,
			None => Arc::new(LoggingFulfillmentSink::new(event_bus.clone())),
		};
		let router = Arc::new(JobRouter::new(
			gate.clone(),
			validator,
			fee,
			store,
			sink,
			event_bus.clone(),
		));

		Ok(SolverEngine {
			config,
			queue,
			watcher,
			gap_sync,
			gate,
			router,
			event_bus,
		})
	}
}

//! Chain id to [`ChainClient`] lookup.

use crate::{ChainClient, ChainError};
use solver_types::ChainId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Clients for every configured chain.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct ChainRegistry {
	clients: HashMap<ChainId, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a client under its own chain id. A second client for the
	/// same chain is rejected.
	pub fn register(&mut self, client: Arc<dyn ChainClient>) -> Result<(), ChainError> {
		let chain_id = client.chain_id();
		if self.clients.contains_key(&chain_id) {
			return Err(ChainError::Config(format!(
				"Chain {} already registered",
				chain_id
			)));
		}
		info!(chain_id, "Registered chain client");
		self.clients.insert(chain_id, client);
		Ok(())
	}

	pub fn get(&self, chain_id: ChainId) -> Option<Arc<dyn ChainClient>> {
		self.clients.get(&chain_id).cloned()
	}

	pub fn get_required(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>, ChainError> {
		self.get(chain_id).ok_or(ChainError::NotConfigured(chain_id))
	}

	pub fn chains(&self) -> Vec<ChainId> {
		let mut chains: Vec<_> = self.clients.keys().copied().collect();
		chains.sort_unstable();
		chains
	}
}

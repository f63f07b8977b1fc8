use serde::{Deserialize, Serialize};
use solver_types::{Address, ChainId, U256};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub solver: SolverConfig,
	pub networks: Vec<NetworkConfig>,
	#[serde(default)]
	pub intent_sources: Vec<IntentSourceConfig>,
	#[serde(default)]
	pub solvers: Vec<SolverChainConfig>,
	#[serde(default)]
	pub intents: IntentsConfig,
	#[serde(default)]
	pub chain_sync: ChainSyncConfig,
	#[serde(default)]
	pub watch: WatchConfig,
	#[serde(default)]
	pub queue: QueueConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub flags: FlagsConfig,
	#[serde(default)]
	pub wallets: WalletsConfig,
}

impl Config {
	pub fn network(&self, chain_id: ChainId) -> Option<&NetworkConfig> {
		self.networks.iter().find(|n| n.chain_id == chain_id)
	}

	/// The intent source watched on `chain_id`, if any.
	pub fn intent_source(&self, chain_id: ChainId) -> Option<&IntentSourceConfig> {
		self.intent_sources.iter().find(|s| s.chain_id == chain_id)
	}

	/// Solver settings for `chain_id`, if the solver operates there.
	pub fn solver_for(&self, chain_id: ChainId) -> Option<&SolverChainConfig> {
		self.solvers.iter().find(|s| s.chain_id == chain_id)
	}

	/// Chains the solver can fulfill on.
	pub fn supported_chains(&self) -> Vec<ChainId> {
		self.solvers.iter().map(|s| s.chain_id).collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
	pub id: String,
	/// Wallet whose token balances back fulfillment.
	pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
	pub chain_id: ChainId,
	pub name: String,
	pub rpc_url: String,
	/// How often subscriptions poll for new blocks.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

/// An intent source contract watched for `IntentCreated` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSourceConfig {
	pub network: String,
	pub chain_id: ChainId,
	pub source_address: Address,
	/// Only intents naming one of these provers are watched.
	pub provers: Vec<Address>,
	/// Reward tokens the solver accepts on this chain.
	#[serde(default)]
	pub tokens: Vec<Address>,
}

/// Per-chain solver settings used when fulfilling on that chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverChainConfig {
	pub chain_id: ChainId,
	pub network: String,
	pub inbox_address: Address,
	/// Upper bound for the solver's native balance on this chain.
	#[serde(default)]
	pub native_max: Option<U256>,
	#[serde(default)]
	pub targets: Vec<TargetConfig>,
	pub fee: FeeConfig,
}

impl SolverChainConfig {
	pub fn target(&self, address: &Address) -> Option<&TargetConfig> {
		self.targets.iter().find(|t| &t.address == address)
	}
}

/// A contract the solver is willing to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
	pub address: Address,
	pub contract_type: ContractType,
	/// Accepted function signatures, e.g. `transfer(address,uint256)`.
	#[serde(default)]
	pub selectors: Vec<String>,
	/// Balance to keep untouched, in whole token units.
	#[serde(default)]
	pub min_balance: u64,
	/// Balance ceiling, in whole token units.
	#[serde(default)]
	pub max_balance: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
	Erc20,
	Erc721,
	Erc1155,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
	pub algorithm: FeeAlgorithm,
	/// Largest total fill accepted, in the 6-decimal base.
	pub limit_token_base6: u64,
}

/// Fee algorithms. Unknown names fail to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeAlgorithm {
	/// `base_fee + floor(total / 100 units) * per_100_unit_fee`
	Linear { base_fee: u64, per_100_unit_fee: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentsConfig {
	/// Funding re-reads after the first one.
	#[serde(default = "default_funded_retries")]
	pub intent_funded_retries: u32,
	#[serde(default = "default_funded_retry_delay_ms")]
	pub intent_funded_retry_delay_ms: u64,
	#[serde(default)]
	pub skip_balance_check: bool,
	#[serde(default)]
	pub native_supported: bool,
	/// Time a prover needs before the reward deadline.
	#[serde(default)]
	pub min_proof_duration_secs: u64,
}

impl Default for IntentsConfig {
	fn default() -> Self {
		Self {
			intent_funded_retries: default_funded_retries(),
			intent_funded_retry_delay_ms: default_funded_retry_delay_ms(),
			skip_balance_check: false,
			native_supported: false,
			min_proof_duration_secs: 0,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSyncConfig {
	/// First block scanned when nothing has been recorded for a chain.
	/// Without it the scan covers only the current head.
	#[serde(default)]
	pub default_start_block: Option<u64>,
	#[serde(default = "default_max_block_range")]
	pub max_block_range: u64,
}

impl Default for ChainSyncConfig {
	fn default() -> Self {
		Self {
			default_start_block: None,
			max_block_range: default_max_block_range(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
	#[serde(default = "default_recovery_base_ms")]
	pub recovery_backoff_base_ms: u64,
	#[serde(default = "default_recovery_max_ms")]
	pub recovery_backoff_max_ms: u64,
	/// A subscription healthy for this long resets the recovery backoff.
	#[serde(default = "default_stability_window_ms")]
	pub recovery_stability_window_ms: u64,
}

impl Default for WatchConfig {
	fn default() -> Self {
		Self {
			recovery_backoff_base_ms: default_recovery_base_ms(),
			recovery_backoff_max_ms: default_recovery_max_ms(),
			recovery_stability_window_ms: default_stability_window_ms(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
	/// Deliveries per job, including the first.
	#[serde(default = "default_attempts")]
	pub attempts: u32,
	#[serde(default)]
	pub backoff: QueueBackoff,
	/// Jobs handled in parallel.
	#[serde(default = "default_concurrency")]
	pub concurrency: usize,
	/// How long the id of a finished job keeps rejecting resubmissions.
	#[serde(default = "default_retain_finished_ms")]
	pub retain_finished_ms: u64,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			attempts: default_attempts(),
			backoff: QueueBackoff::default(),
			concurrency: default_concurrency(),
			retain_finished_ms: default_retain_finished_ms(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBackoff {
	#[serde(rename = "type")]
	pub kind: BackoffKind,
	pub delay_ms: u64,
}

impl Default for QueueBackoff {
	fn default() -> Self {
		Self {
			kind: BackoffKind::Exponential,
			delay_ms: 2_000,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
	Fixed,
	Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	/// Storage implementation name, e.g. `memory` or `file`.
	pub backend: String,
	/// Backend-specific settings.
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagsConfig {
	/// Admit only intents created by approved smart wallets.
	#[serde(default)]
	pub bend_wallet_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletsConfig {
	#[serde(default)]
	pub allowed: Vec<Address>,
}

fn default_poll_interval_ms() -> u64 {
	3_000
}

fn default_funded_retries() -> u32 {
	3
}

fn default_funded_retry_delay_ms() -> u64 {
	500
}

fn default_max_block_range() -> u64 {
	10_000
}

fn default_recovery_base_ms() -> u64 {
	1_000
}

fn default_recovery_max_ms() -> u64 {
	30_000
}

fn default_stability_window_ms() -> u64 {
	60_000
}

fn default_attempts() -> u32 {
	3
}

fn default_retain_finished_ms() -> u64 {
	3_600_000
}

fn default_concurrency() -> usize {
	8
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

//! Structural admission checks.
//!
//! Each predicate in [`ValidationChecks`] is evaluated independently so a
//! rejected intent records every reason it was rejected for, not just the
//! first one hit.

use crate::IntentError;
use alloy::primitives::keccak256;
use async_trait::async_trait;
use solver_config::{Config, IntentSourceConfig, IntentsConfig, SolverChainConfig};
use solver_fee::{BalanceInterface, FeeError, FeeFeasibilityEngine};
use solver_types::{utils::truncate_hash, Address, ChainId, Intent, ValidationChecks, U256};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ValidationInterface: Send + Sync {
	/// Evaluates every structural predicate for `intent` against the solver
	/// configured for its destination. `intent_funded` is left `false`.
	async fn assert_validations(
		&self,
		intent: &Intent,
		solver: &SolverChainConfig,
	) -> Result<ValidationChecks, IntentError>;
}

/// Checks an intent against the static configuration and the solver's
/// current balances.
pub struct ConfigValidation {
	fee: Arc<FeeFeasibilityEngine>,
	balances: Arc<dyn BalanceInterface>,
	sources: Vec<IntentSourceConfig>,
	solvers: Vec<SolverChainConfig>,
	intents: IntentsConfig,
}

impl ConfigValidation {
	pub fn new(
		fee: Arc<FeeFeasibilityEngine>,
		balances: Arc<dyn BalanceInterface>,
		sources: Vec<IntentSourceConfig>,
		solvers: Vec<SolverChainConfig>,
		intents: IntentsConfig,
	) -> Self {
		Self {
			fee,
			balances,
			sources,
			solvers,
			intents,
		}
	}

	pub fn from_config(
		fee: Arc<FeeFeasibilityEngine>,
		balances: Arc<dyn BalanceInterface>,
		config: &Config,
	) -> Self {
		Self::new(
			fee,
			balances,
			config.intent_sources.clone(),
			config.solvers.clone(),
			config.intents.clone(),
		)
	}

	fn solver(&self, chain_id: ChainId) -> Option<&SolverChainConfig> {
		self.solvers.iter().find(|s| s.chain_id == chain_id)
	}

	pub fn supported_prover(&self, intent: &Intent) -> bool {
		self.sources
			.iter()
			.find(|s| s.chain_id == intent.route.source)
			.is_some_and(|s| s.provers.contains(&intent.reward.prover))
	}

	/// Native value is accepted only when enabled, and then only when the
	/// reward's native value covers what the calls send.
	pub fn supported_native(&self, intent: &Intent) -> bool {
		if !intent.is_native() {
			return true;
		}
		if !self.intents.native_supported {
			return false;
		}
		let sent = intent
			.route
			.calls
			.iter()
			.fold(U256::ZERO, |acc, c| acc.saturating_add(c.value));
		intent.reward.native_value >= sent
	}

	pub fn supported_targets(&self, intent: &Intent, solver: &SolverChainConfig) -> bool {
		intent
			.route
			.function_targets()
			.iter()
			.all(|target| solver.target(target).is_some())
	}

	/// Every call must match one of its target's configured selectors.
	/// Plain value transfers are allowed when native intents are.
	pub fn supported_transaction(&self, intent: &Intent, solver: &SolverChainConfig) -> bool {
		if intent.route.calls.is_empty() {
			return false;
		}
		intent.route.calls.iter().all(|call| {
			let Some(selector) = call.selector() else {
				return !call.is_function_call() && self.intents.native_supported;
			};
			solver.target(&call.target).is_some_and(|target| {
				target
					.selectors
					.iter()
					.any(|sig| keccak256(sig.as_bytes())[..4] == selector)
			})
		})
	}

	/// Total normalized fill within the destination solver's limit.
	pub async fn valid_transfer_limit(
		&self,
		intent: &Intent,
		solver: &SolverChainConfig,
	) -> Result<bool, IntentError> {
		let total = business(self.fee.get_total_fill(intent).await, "valid_transfer_limit")?;
		Ok(total.is_some_and(|total| total <= U256::from(solver.fee.limit_token_base6)))
	}

	/// Receiving the reward must not push the solver's source chain balances
	/// past their configured ceilings.
	pub async fn valid_source_max(&self, intent: &Intent) -> Result<bool, IntentError> {
		let source_chain = intent.route.source;
		let Some(source_solver) = self.solver(source_chain) else {
			debug!(chain_id = source_chain, "No solver configured for source chain");
			return Ok(false);
		};

		if let Some(native_max) = source_solver.native_max {
			if intent.reward.native_value > native_max {
				return Ok(false);
			}
		}

		let tokens: Vec<Address> = intent.reward.tokens.iter().map(|t| t.token).collect();
		if tokens.is_empty() {
			return Ok(true);
		}
		let balances = self.balances.fetch_token_balances(source_chain, tokens).await;
		let Some(balances) = business(balances, "valid_source_max")? else {
			return Ok(false);
		};

		for reward in &intent.reward.tokens {
			let Some(target) = source_solver.target(&reward.token) else {
				continue;
			};
			let Some(max_balance) = target.max_balance else {
				continue;
			};
			let Some(held) = balances.iter().find(|b| b.address == reward.token) else {
				return Ok(false);
			};
			let ceiling = U256::from(max_balance).saturating_mul(U256::from(10u64).pow(U256::from(held.decimals)));
			if held.balance.saturating_add(reward.amount) > ceiling {
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// The deadline leaves at least the configured proof duration.
	pub fn valid_expiration_time(&self, intent: &Intent) -> bool {
		let now = chrono::Utc::now().timestamp().max(0) as u64;
		intent.reward.deadline >= now.saturating_add(self.intents.min_proof_duration_secs)
	}

	pub fn valid_destination(&self, intent: &Intent) -> bool {
		self.solver(intent.route.destination).is_some()
	}

	pub fn fulfill_on_different_chain(&self, intent: &Intent) -> bool {
		intent.route.source != intent.route.destination
	}

	/// The solver holds every route token on the destination chain.
	pub async fn sufficient_balance(
		&self,
		intent: &Intent,
		solver: &SolverChainConfig,
	) -> Result<bool, IntentError> {
		if self.intents.skip_balance_check || intent.route.tokens.is_empty() {
			return Ok(true);
		}
		let tokens: Vec<Address> = intent.route.tokens.iter().map(|t| t.token).collect();
		let balances = self.balances.fetch_token_balances(solver.chain_id, tokens).await;
		let Some(balances) = business(balances, "sufficient_balance")? else {
			return Ok(false);
		};

		Ok(intent.route.tokens.iter().all(|required| {
			balances
				.iter()
				.find(|b| b.address == required.token)
				.is_some_and(|b| b.balance >= required.amount)
		}))
	}
}

#[async_trait]
impl ValidationInterface for ConfigValidation {
	async fn assert_validations(
		&self,
		intent: &Intent,
		solver: &SolverChainConfig,
	) -> Result<ValidationChecks, IntentError> {
		let checks = ValidationChecks {
			supported_prover: self.supported_prover(intent),
			supported_native: self.supported_native(intent),
			supported_targets: self.supported_targets(intent, solver),
			supported_transaction: self.supported_transaction(intent, solver),
			valid_transfer_limit: self.valid_transfer_limit(intent, solver).await?,
			valid_source_max: self.valid_source_max(intent).await?,
			valid_expiration_time: self.valid_expiration_time(intent),
			valid_destination: self.valid_destination(intent),
			fulfill_on_different_chain: self.fulfill_on_different_chain(intent),
			sufficient_balance: self.sufficient_balance(intent, solver).await?,
			intent_funded: false,
		};

		debug!(
			intent_hash = %truncate_hash(&intent.hash.to_string()),
			failed = ?checks.failed_checks(),
			"Structural validation"
		);
		Ok(checks)
	}
}

/// RPC failures propagate so the job is retried. Any other fee error means
/// the predicate does not hold.
fn business<T>(result: Result<T, FeeError>, check: &str) -> Result<Option<T>, IntentError> {
	match result {
		Ok(value) => Ok(Some(value)),
		Err(e) if e.is_transient() => Err(e.into()),
		Err(e) => {
			warn!(check, error = %e, "Check failed");
			Ok(None)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;
	use alloy::sol_types::SolCall;
	use solver_chains::{ChainClient, ChainError, ChainRegistry, MockChainClient};
	use solver_config::{ContractType, FeeAlgorithm, FeeConfig, TargetConfig};
	use solver_fee::{MockBalanceInterface, OnChainBalances, TokenBalance};
	use solver_types::contracts::IERC20;
	use solver_types::{Bytes, Call, Reward, Route, TokenAmount, B256};

	const USDC_OP: Address = address!("00000000000000000000000000000000000000e1");
	const USDC_BASE: Address = address!("00000000000000000000000000000000000000bb");
	const PROVER: Address = address!("00000000000000000000000000000000000000d1");

	fn solver(chain_id: ChainId, token: Address) -> SolverChainConfig {
		SolverChainConfig {
			chain_id,
			network: format!("chain-{}", chain_id),
			inbox_address: Address::repeat_byte(0xaa),
			native_max: None,
			targets: vec![TargetConfig {
				address: token,
				contract_type: ContractType::Erc20,
				selectors: vec!["transfer(address,uint256)".to_string()],
				min_balance: 0,
				max_balance: Some(1_000),
			}],
			fee: FeeConfig {
				algorithm: FeeAlgorithm::Linear {
					base_fee: 20_000,
					per_100_unit_fee: 15_000,
				},
				limit_token_base6: 1_000_000_000,
			},
		}
	}

	fn source() -> IntentSourceConfig {
		IntentSourceConfig {
			network: "opt-mainnet".to_string(),
			chain_id: 10,
			source_address: Address::repeat_byte(0xa0),
			provers: vec![PROVER],
			tokens: vec![USDC_OP],
		}
	}

	fn transfer(amount: u64) -> Bytes {
		IERC20::transferCall {
			to: Address::repeat_byte(0x99),
			amount: U256::from(amount),
		}
		.abi_encode()
		.into()
	}

	fn intent() -> Intent {
		Intent::new(
			Route {
				salt: B256::repeat_byte(1),
				source: 10,
				destination: 8453,
				inbox: Address::repeat_byte(0xaa),
				tokens: vec![TokenAmount {
					token: USDC_BASE,
					amount: U256::from(1_000_000u64),
				}],
				calls: vec![Call {
					target: USDC_BASE,
					data: transfer(1_000_000),
					value: U256::ZERO,
				}],
			},
			Reward {
				creator: Address::repeat_byte(0xc1),
				prover: PROVER,
				deadline: (chrono::Utc::now().timestamp() + 3_600) as u64,
				native_value: U256::ZERO,
				tokens: vec![TokenAmount {
					token: USDC_OP,
					amount: U256::from(1_100_000u64),
				}],
			},
			0,
		)
	}

	fn balances_with(op_balance: u64, base_balance: u64) -> MockBalanceInterface {
		let mut balances = MockBalanceInterface::new();
		balances
			.expect_fetch_token_balances()
			.returning(move |chain_id, tokens| {
				let balance = if chain_id == 10 { op_balance } else { base_balance };
				Ok(tokens
					.into_iter()
					.map(|address| TokenBalance {
						address,
						decimals: 6,
						balance: U256::from(balance),
					})
					.collect())
			});
		balances
	}

	fn validation(balances: impl BalanceInterface + 'static, intents: IntentsConfig) -> ConfigValidation {
		let balances: Arc<dyn BalanceInterface> = Arc::new(balances);
		let solvers = vec![solver(10, USDC_OP), solver(8453, USDC_BASE)];
		let fee = Arc::new(FeeFeasibilityEngine::new(
			balances.clone(),
			solvers.clone(),
			vec![source()],
			intents.skip_balance_check,
		));
		ConfigValidation::new(fee, balances, vec![source()], solvers, intents)
	}

	#[tokio::test]
	async fn test_all_structural_checks_pass() {
		let validation = validation(balances_with(5_000_000, 50_000_000), IntentsConfig::default());
		let checks = validation
			.assert_validations(&intent(), &solver(8453, USDC_BASE))
			.await
			.unwrap();
		assert_eq!(checks, ValidationChecks::all_structural_passed());
	}

	#[tokio::test]
	async fn test_every_failure_is_recorded() {
		let validation = validation(balances_with(5_000_000, 50_000_000), IntentsConfig::default());
		let mut intent = intent();
		intent.reward.prover = Address::repeat_byte(0x01);
		intent.reward.deadline = 1;
		intent.route.destination = 10;

		let checks = validation
			.assert_validations(&intent, &solver(8453, USDC_BASE))
			.await
			.unwrap();
		let failed = checks.failed_checks();
		assert!(failed.contains(&"supported_prover"));
		assert!(failed.contains(&"valid_expiration_time"));
		assert!(failed.contains(&"fulfill_on_different_chain"));
		assert!(checks.valid_destination);
	}

	#[tokio::test]
	async fn test_transaction_selector_must_be_configured() {
		let validation = validation(balances_with(0, 0), IntentsConfig::default());
		let solver = solver(8453, USDC_BASE);

		let mut intent = intent();
		assert!(validation.supported_transaction(&intent, &solver));

		intent.route.calls[0].data = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]);
		assert!(!validation.supported_transaction(&intent, &solver));

		intent.route.calls.clear();
		assert!(!validation.supported_transaction(&intent, &solver));
	}

	#[tokio::test]
	async fn test_unknown_target() {
		let validation = validation(balances_with(0, 0), IntentsConfig::default());
		let mut intent = intent();
		intent.route.calls[0].target = Address::repeat_byte(0x42);
		assert!(!validation.supported_targets(&intent, &solver(8453, USDC_BASE)));
	}

	#[tokio::test]
	async fn test_native_rules() {
		let mut intent = intent();
		intent.route.calls[0].value = U256::from(10u64);

		let disabled = validation(balances_with(0, 0), IntentsConfig::default());
		assert!(!disabled.supported_native(&intent));

		let enabled = validation(
			balances_with(0, 0),
			IntentsConfig {
				native_supported: true,
				..IntentsConfig::default()
			},
		);
		assert!(!enabled.supported_native(&intent));
		intent.reward.native_value = U256::from(10u64);
		assert!(enabled.supported_native(&intent));
	}

	#[tokio::test]
	async fn test_source_max_balance() {
		// max_balance is 1_000 whole units: 1_000_000_000 in 6 decimals.
		let full = validation(balances_with(999_000_000, 0), IntentsConfig::default());
		assert!(!full.valid_source_max(&intent()).await.unwrap());

		let room = validation(balances_with(998_000_000, 0), IntentsConfig::default());
		assert!(room.valid_source_max(&intent()).await.unwrap());
	}

	#[tokio::test]
	async fn test_insufficient_balance_unless_skipped() {
		let solver = solver(8453, USDC_BASE);
		let short = validation(balances_with(0, 999_999), IntentsConfig::default());
		assert!(!short.sufficient_balance(&intent(), &solver).await.unwrap());

		let skipped = validation(
			balances_with(0, 0),
			IntentsConfig {
				skip_balance_check: true,
				..IntentsConfig::default()
			},
		);
		assert!(skipped.sufficient_balance(&intent(), &solver).await.unwrap());
	}

	#[tokio::test]
	async fn test_transfer_limit() {
		let mut solver = solver(8453, USDC_BASE);
		let validation = validation(balances_with(0, 50_000_000), IntentsConfig::default());
		assert!(validation.valid_transfer_limit(&intent(), &solver).await.unwrap());

		solver.fee.limit_token_base6 = 999_999;
		assert!(!validation.valid_transfer_limit(&intent(), &solver).await.unwrap());
	}

	#[tokio::test]
	async fn test_rpc_failure_propagates() {
		let mut balances = MockBalanceInterface::new();
		balances
			.expect_fetch_token_balances()
			.returning(|_, _| Err(FeeError::Chain(ChainError::Rpc("timeout".into()))));
		let validation = validation(balances, IntentsConfig::default());

		let err = validation
			.assert_validations(&intent(), &solver(8453, USDC_BASE))
			.await
			.unwrap_err();
		assert!(matches!(err, IntentError::Fee(FeeError::Chain(_))));
	}

	#[tokio::test]
	async fn test_unreachable_chain_is_not_a_failed_check() {
		let mut registry = ChainRegistry::new();
		for chain_id in [10u64, 8453] {
			let mut client = MockChainClient::new();
			client.expect_chain_id().return_const(chain_id);
			client
				.expect_call()
				.returning(|_, _| Err(ChainError::Rpc("connection refused".into())));
			registry.register(Arc::new(client) as Arc<dyn ChainClient>).unwrap();
		}
		let balances = OnChainBalances::new(Arc::new(registry), Address::repeat_byte(0xf1));
		let validation = validation(balances, IntentsConfig::default());

		let err = validation
			.valid_source_max(&intent())
			.await
			.unwrap_err();
		assert!(matches!(err, IntentError::Fee(FeeError::Chain(ChainError::Rpc(_)))));

		let err = validation
			.assert_validations(&intent(), &solver(8453, USDC_BASE))
			.await
			.unwrap_err();
		assert!(matches!(err, IntentError::Fee(ref e) if e.is_transient()));
	}
}

//! Feasibility of fulfilling an intent for its reward.

use crate::balance::{BalanceInterface, TokenBalance};
use crate::normalize::{convert_normalize, normalize_balance, normalize_signed, NormalizedToken};
use crate::{FeeError, BASE_DECIMALS};
use alloy::primitives::I256;
use alloy::sol_types::SolCall;
use solver_config::{Config, ContractType, FeeAlgorithm, IntentSourceConfig, SolverChainConfig, TargetConfig};
use solver_types::contracts::IERC20;
use solver_types::{utils::truncate_hash, Address, Call, ChainId, Intent, U256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";

/// `per_100_unit_fee` applies per 100 whole units in the 6-decimal base.
const LINEAR_FEE_UNIT: u64 = 100_000_000;

/// Source chain liquidity of one token, ranked by [`FeeFeasibilityEngine::calculate_tokens`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDelta {
	pub token: TokenBalance,
	/// `balance - min_balance`, normalized. Negative when under the minimum.
	pub delta: I256,
}

#[derive(Debug, Clone)]
pub struct CalculatedTokens {
	pub solver: SolverChainConfig,
	pub rewards: Vec<NormalizedToken>,
	pub calls: Vec<NormalizedToken>,
	/// Largest surplus first.
	pub src_deficit_descending: Vec<TokenDelta>,
}

/// Decides whether an intent's reward covers the cost of its route.
///
/// Fill and reward amounts are read against the solver's configuration for
/// the destination and source chains and normalized to the 6-decimal base
/// before they are compared.
pub struct FeeFeasibilityEngine {
	balances: Arc<dyn BalanceInterface>,
	solvers: Vec<SolverChainConfig>,
	sources: Vec<IntentSourceConfig>,
	skip_balance_check: bool,
}

impl FeeFeasibilityEngine {
	pub fn new(
		balances: Arc<dyn BalanceInterface>,
		solvers: Vec<SolverChainConfig>,
		sources: Vec<IntentSourceConfig>,
		skip_balance_check: bool,
	) -> Self {
		Self {
			balances,
			solvers,
			sources,
			skip_balance_check,
		}
	}

	pub fn from_config(balances: Arc<dyn BalanceInterface>, config: &Config) -> Self {
		Self::new(
			balances,
			config.solvers.clone(),
			config.intent_sources.clone(),
			config.intents.skip_balance_check,
		)
	}

	fn solver(&self, chain_id: ChainId) -> Option<&SolverChainConfig> {
		self.solvers.iter().find(|s| s.chain_id == chain_id)
	}

	fn source(&self, chain_id: ChainId) -> Option<&IntentSourceConfig> {
		self.sources.iter().find(|s| s.chain_id == chain_id)
	}

	/// `Ok(())` when the solver can fulfill the route and the reward covers
	/// the ask.
	pub async fn is_route_feasible(&self, intent: &Intent) -> Result<(), FeeError> {
		// Multiple calls are not supported until they have been tested.
		if intent.route.calls.len() != 1 {
			return Err(FeeError::MultiFulfillRoute);
		}

		let mut seen = HashSet::new();
		if !intent.reward.tokens.iter().all(|t| seen.insert(t.token)) {
			return Err(FeeError::DuplicatedRewardToken);
		}

		let total_fill = self.get_total_fill(intent).await?;
		let total_rewards = self.get_total_rewards(intent).await?;
		let ask = self.get_ask(total_fill, intent)?;

		debug!(
			intent_hash = %truncate_hash(&intent.hash.to_string()),
			%total_fill,
			%total_rewards,
			%ask,
			"Route feasibility"
		);

		if total_rewards < ask {
			return Err(FeeError::RouteIsInfeasable {
				ask,
				rewards: total_rewards,
			});
		}
		Ok(())
	}

	/// `Ok(())` when the accepted rewards at least cover the fee charged on
	/// them.
	pub async fn is_reward_feasible(&self, intent: &Intent) -> Result<(), FeeError> {
		let rewards = self.get_total_rewards(intent).await?;
		let fee = self.get_fee(rewards, intent)?;
		if rewards < fee {
			return Err(FeeError::RewardIsInfeasable { fee, rewards });
		}
		Ok(())
	}

	/// `fee(total_fill) + total_fill`
	pub fn get_ask(&self, total_fill: U256, intent: &Intent) -> Result<U256, FeeError> {
		Ok(self.get_fee(total_fill, intent)?.saturating_add(total_fill))
	}

	/// Fee charged by the destination chain's solver for `total`.
	pub fn get_fee(&self, total: U256, intent: &Intent) -> Result<U256, FeeError> {
		let destination = intent.route.destination;
		let solver = self
			.solver(destination)
			.ok_or(FeeError::NoSolverForDestination(destination))?;

		let fee = match solver.fee.algorithm {
			FeeAlgorithm::Linear {
				base_fee,
				per_100_unit_fee,
			} => {
				let units = total / U256::from(LINEAR_FEE_UNIT);
				U256::from(base_fee).saturating_add(units.saturating_mul(U256::from(per_100_unit_fee)))
			}
		};
		Ok(fee)
	}

	/// Sum of the normalized ERC-20 amounts the route transfers.
	pub async fn get_total_fill(&self, intent: &Intent) -> Result<U256, FeeError> {
		let calls = self.get_calls_normalized(intent).await?;
		Ok(calls
			.iter()
			.fold(U256::ZERO, |acc, call| acc.saturating_add(call.balance)))
	}

	/// Sum of the normalized reward tokens accepted on the source chain.
	pub async fn get_total_rewards(&self, intent: &Intent) -> Result<U256, FeeError> {
		let rewards = self.get_rewards_normalized(intent).await?;
		Ok(rewards
			.iter()
			.fold(U256::ZERO, |acc, reward| acc.saturating_add(reward.balance)))
	}

	pub async fn get_rewards_normalized(&self, intent: &Intent) -> Result<Vec<NormalizedToken>, FeeError> {
		let chain_id = intent.route.source;
		let source = self
			.source(chain_id)
			.ok_or(FeeError::NoIntentSourceForSource(chain_id))?;

		let accepted: Vec<Address> = intent
			.reward
			.tokens
			.iter()
			.filter(|reward| source.tokens.contains(&reward.token))
			.map(|reward| reward.token)
			.collect();
		if accepted.is_empty() && intent.is_native() {
			return Ok(Vec::new());
		}

		let balances = self.balances.fetch_token_balances(chain_id, accepted).await?;
		if balances.is_empty() {
			return Err(FeeError::FetchingRewardTokensFailed(chain_id));
		}

		Ok(balances
			.iter()
			.filter_map(|balance| {
				let reward = intent.reward.tokens.iter().find(|r| r.token == balance.address)?;
				Some(convert_normalize(reward.amount, chain_id, balance.address, balance.decimals))
			})
			.collect())
	}

	/// Normalized transfer amount of every call.
	///
	/// Each call must be an ERC-20 `transfer` on a configured target, and the
	/// solver must hold the amount above the target's minimum balance unless
	/// balance checks are disabled.
	pub async fn get_calls_normalized(&self, intent: &Intent) -> Result<Vec<NormalizedToken>, FeeError> {
		let destination = intent.route.destination;
		let solver = self
			.solver(destination)
			.ok_or(FeeError::NoSolverForDestination(destination))?;

		let targets = intent.route.function_targets();
		if targets.is_empty() && intent.is_native() {
			return Ok(Vec::new());
		}

		let balances = self.balances.fetch_token_balances(solver.chain_id, targets).await?;
		if balances.is_empty() {
			return Err(FeeError::FetchingCallTokensFailed(solver.chain_id));
		}

		intent
			.route
			.function_calls()
			.map(|call| self.normalize_call(solver, call, &balances))
			.collect()
	}

	fn normalize_call(
		&self,
		solver: &SolverChainConfig,
		call: &Call,
		balances: &[TokenBalance],
	) -> Result<NormalizedToken, FeeError> {
		let Some(target) = solver.target(&call.target).filter(|t| is_erc20_transfer(t, call)) else {
			error!(chain_id = solver.chain_id, target = %call.target, "Call is not an ERC-20 transfer");
			return Err(FeeError::NonErc20TargetInCalls);
		};

		let token = balances
			.iter()
			.find(|b| b.address == call.target)
			.ok_or(FeeError::FailedToFetchTarget {
				chain_id: solver.chain_id,
				target: call.target,
			})?;

		let transfer = IERC20::transferCall::abi_decode(&call.data)
			.map_err(|_| FeeError::InvalidFunctionData(call.target))?;

		let min_balance = self.get_normalized_min_balance(target, token.decimals);
		if !self.skip_balance_check && transfer.amount > token.balance.saturating_sub(min_balance) {
			error!(
				chain_id = solver.chain_id,
				target = %call.target,
				amount = %transfer.amount,
				balance = %token.balance,
				min_balance = %min_balance,
				"Solver lacks liquidity"
			);
			return Err(FeeError::SolverLacksLiquidity {
				chain_id: solver.chain_id,
				target: call.target,
				amount: transfer.amount,
				balance: token.balance,
				min_balance,
			});
		}

		Ok(convert_normalize(
			transfer.amount,
			solver.chain_id,
			call.target,
			token.decimals,
		))
	}

	/// A target's minimum balance, configured in whole units, in the
	/// token's own decimals.
	pub fn get_normalized_min_balance(&self, target: &TargetConfig, decimals: u8) -> U256 {
		normalize_balance(U256::from(target.min_balance), 0, decimals)
	}

	/// The solver's source chain tokens ordered by normalized surplus over
	/// their minimum balance, together with the intent's normalized rewards
	/// and calls.
	pub async fn calculate_tokens(&self, intent: &Intent) -> Result<CalculatedTokens, FeeError> {
		let source_chain = intent.route.source;
		let destination = intent.route.destination;
		let source = self
			.source(source_chain)
			.ok_or(FeeError::NoIntentSourceForSource(source_chain))?;
		let solver = self
			.solver(destination)
			.ok_or(FeeError::NoSolverForDestination(destination))?
			.clone();

		let held = self
			.balances
			.fetch_token_balances(source_chain, source.tokens.clone())
			.await?;
		if held.is_empty() && !source.tokens.is_empty() {
			return Err(FeeError::FetchingCallTokensFailed(source_chain));
		}

		let source_solver = self.solver(source_chain);
		let mut src_deficit_descending: Vec<TokenDelta> = held
			.into_iter()
			.map(|token| {
				let min_balance = source_solver
					.and_then(|s| s.target(&token.address))
					.map(|t| self.get_normalized_min_balance(t, token.decimals))
					.unwrap_or_default();
				TokenDelta {
					token,
					delta: normalize_signed(
						signed(token.balance).saturating_sub(signed(min_balance)),
						token.decimals,
						BASE_DECIMALS,
					),
				}
			})
			.collect();
		src_deficit_descending.sort_by(|a, b| b.delta.cmp(&a.delta));

		let rewards = self.get_rewards_normalized(intent).await?;
		let calls = self.get_calls_normalized(intent).await?;

		Ok(CalculatedTokens {
			solver,
			rewards,
			calls,
			src_deficit_descending,
		})
	}
}

fn is_erc20_transfer(target: &TargetConfig, call: &Call) -> bool {
	target.contract_type == ContractType::Erc20
		&& target.selectors.iter().any(|s| s == TRANSFER_SIGNATURE)
		&& call.selector() == Some(IERC20::transferCall::SELECTOR)
}

fn signed(value: U256) -> I256 {
	I256::try_from(value).unwrap_or(I256::MAX)
}

//! Fee and feasibility decisions.
//!
//! Every amount that takes part in a comparison is first normalized to
//! [`BASE_DECIMALS`] with integer arithmetic, so tokens with different
//! decimals, possibly on different chains, can be added and compared.

use solver_chains::ChainError;
use solver_types::{Address, ChainId, U256};
use thiserror::Error;

pub mod balance;
pub mod engine;
pub mod normalize;

pub use balance::{BalanceInterface, OnChainBalances, TokenBalance};
#[cfg(any(test, feature = "testing"))]
pub use balance::MockBalanceInterface;
pub use engine::{CalculatedTokens, FeeFeasibilityEngine, TokenDelta};
pub use normalize::{convert_normalize, deconvert_normalize, normalize_balance, NormalizedToken};

/// Decimal base all compared amounts are converted to.
pub const BASE_DECIMALS: u8 = 6;

#[derive(Debug, Error, Clone)]
pub enum FeeError {
	#[error("Only routes with a single call are supported")]
	MultiFulfillRoute,
	#[error("Reward contains duplicated tokens")]
	DuplicatedRewardToken,
	#[error("No solver configured for destination chain {0}")]
	NoSolverForDestination(ChainId),
	#[error("No intent source configured for source chain {0}")]
	NoIntentSourceForSource(ChainId),
	#[error("Route calls a target that is not an ERC-20 transfer")]
	NonErc20TargetInCalls,
	#[error("Invalid function data for target {0}")]
	InvalidFunctionData(Address),
	#[error("Failed to fetch target {target} on chain {chain_id}")]
	FailedToFetchTarget { chain_id: ChainId, target: Address },
	#[error("Failed to fetch call tokens on chain {0}")]
	FetchingCallTokensFailed(ChainId),
	#[error("Failed to fetch reward tokens on chain {0}")]
	FetchingRewardTokensFailed(ChainId),
	#[error(
		"Solver lacks liquidity on chain {chain_id} for {target}: needs {amount}, has {balance} with minimum {min_balance}"
	)]
	SolverLacksLiquidity {
		chain_id: ChainId,
		target: Address,
		amount: U256,
		balance: U256,
		min_balance: U256,
	},
	#[error("Route is infeasible: ask {ask} exceeds rewards {rewards}")]
	RouteIsInfeasable { ask: U256, rewards: U256 },
	#[error("Reward is infeasible: fee {fee} exceeds rewards {rewards}")]
	RewardIsInfeasable { fee: U256, rewards: U256 },
	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),
}

impl FeeError {
	/// Missing configuration for a chain. Retrying cannot help.
	pub fn is_configuration(&self) -> bool {
		matches!(
			self,
			FeeError::NoSolverForDestination(_) | FeeError::NoIntentSourceForSource(_)
		)
	}

	/// RPC failures that may succeed on a later attempt.
	pub fn is_transient(&self) -> bool {
		matches!(self, FeeError::Chain(_))
	}

	/// An economic or structural rejection of the intent itself.
	pub fn is_rejection(&self) -> bool {
		!self.is_configuration() && !self.is_transient()
	}
}

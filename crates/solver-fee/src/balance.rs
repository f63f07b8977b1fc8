//! Solver token balances.

use crate::FeeError;
use async_trait::async_trait;
use futures::future::join_all;
use solver_chains::{contracts, ChainError, ChainRegistry};
use solver_types::{Address, ChainId, U256};
use std::sync::Arc;
use tracing::warn;

/// Balance of one ERC-20 token held by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
	pub address: Address,
	pub decimals: u8,
	pub balance: U256,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BalanceInterface: Send + Sync {
	/// Reads the solver's balance and decimals for each token on `chain_id`.
	///
	/// A token whose contract reverts or answers with undecodable data is
	/// left out of the result. Any other failure fails the whole read, so a
	/// flaky RPC never looks like a missing token.
	async fn fetch_token_balances(
		&self,
		chain_id: ChainId,
		tokens: Vec<Address>,
	) -> Result<Vec<TokenBalance>, FeeError>;
}

/// Reads balances of a fixed solver wallet through the chain clients.
pub struct OnChainBalances {
	chains: Arc<ChainRegistry>,
	owner: Address,
}

impl OnChainBalances {
	pub fn new(chains: Arc<ChainRegistry>, owner: Address) -> Self {
		Self { chains, owner }
	}
}

#[async_trait]
impl BalanceInterface for OnChainBalances {
	async fn fetch_token_balances(
		&self,
		chain_id: ChainId,
		tokens: Vec<Address>,
	) -> Result<Vec<TokenBalance>, FeeError> {
		let client = self.chains.get_required(chain_id)?;
		let client = client.as_ref();
		let owner = self.owner;

		let reads = tokens.into_iter().map(|token| async move {
			let balance = contracts::erc20_balance(client, token, owner).await;
			let decimals = contracts::erc20_decimals(client, token).await;
			(token, balance, decimals)
		});

		let mut balances = Vec::new();
		for (token, balance, decimals) in join_all(reads).await {
			match (balance, decimals) {
				(Ok(balance), Ok(decimals)) => balances.push(TokenBalance {
					address: token,
					decimals,
					balance,
				}),
				(balance, decimals) => {
					let errors: Vec<ChainError> = [balance.err(), decimals.err()]
						.into_iter()
						.flatten()
						.collect();
					if let Some(e) = errors.iter().find(|e| !is_deterministic(e)) {
						return Err(e.clone().into());
					}
					warn!(chain_id, token = %token, ?errors, "Skipping unreadable token");
				}
			}
		}
		Ok(balances)
	}
}

/// Failures that repeating the same read cannot fix.
fn is_deterministic(error: &ChainError) -> bool {
	matches!(error, ChainError::Reverted(_) | ChainError::Decode(_))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::sol_types::{SolCall, SolValue};
	use solver_chains::{ChainClient, MockChainClient};
	use solver_types::contracts::IERC20;

	#[tokio::test]
	async fn test_reads_balance_and_decimals_per_token() {
		let good = Address::repeat_byte(0xbb);
		let broken = Address::repeat_byte(0xbc);

		let mut client = MockChainClient::new();
		client.expect_chain_id().return_const(8453u64);
		client.expect_call().returning(move |to, data| {
			if to == broken {
				return Err(ChainError::Reverted("execution reverted".into()));
			}
			if data[..4] == IERC20::balanceOfCall::SELECTOR {
				Ok(U256::from(5_000_000u64).abi_encode().into())
			} else {
				Ok(U256::from(6u8).abi_encode().into())
			}
		});

		let mut registry = ChainRegistry::new();
		registry.register(Arc::new(client) as Arc<dyn ChainClient>).unwrap();
		let balances = OnChainBalances::new(Arc::new(registry), Address::repeat_byte(0xf1));

		let result = balances
			.fetch_token_balances(8453, vec![good, broken])
			.await
			.unwrap();
		assert_eq!(
			result,
			vec![TokenBalance {
				address: good,
				decimals: 6,
				balance: U256::from(5_000_000u64),
			}]
		);
	}

	#[tokio::test]
	async fn test_rpc_failure_fails_the_whole_read() {
		let mut client = MockChainClient::new();
		client.expect_chain_id().return_const(8453u64);
		client
			.expect_call()
			.returning(|_, _| Err(ChainError::Rpc("connection refused".into())));

		let mut registry = ChainRegistry::new();
		registry.register(Arc::new(client) as Arc<dyn ChainClient>).unwrap();
		let balances = OnChainBalances::new(Arc::new(registry), Address::repeat_byte(0xf1));

		let err = balances
			.fetch_token_balances(8453, vec![Address::repeat_byte(0xbb)])
			.await
			.unwrap_err();
		assert!(matches!(err, FeeError::Chain(ChainError::Rpc(_))));
		assert!(err.is_transient());
	}

	#[tokio::test]
	async fn test_unknown_chain() {
		let balances = OnChainBalances::new(Arc::new(ChainRegistry::new()), Address::ZERO);
		assert!(matches!(
			balances.fetch_token_balances(1, vec![]).await,
			Err(FeeError::Chain(ChainError::NotConfigured(1)))
		));
	}
}

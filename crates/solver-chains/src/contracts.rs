//! Typed contract reads over [`ChainClient::call`].

use crate::{ChainClient, ChainError};
use alloy::sol_types::SolCall;
use solver_types::contracts::{isIntentFundedCall, IERC20};
use solver_types::{Address, Intent, U256};

/// Asks the intent source whether `intent`'s reward escrow is funded.
pub async fn is_intent_funded(
	client: &dyn ChainClient,
	intent_source: Address,
	intent: &Intent,
) -> Result<bool, ChainError> {
	let data = isIntentFundedCall {
		intent: intent.to_abi(),
	}
	.abi_encode();
	let output = client.call(intent_source, data.into()).await?;
	isIntentFundedCall::abi_decode_returns(&output).map_err(|e| ChainError::Decode(e.to_string()))
}

pub async fn erc20_balance(
	client: &dyn ChainClient,
	token: Address,
	owner: Address,
) -> Result<U256, ChainError> {
	let data = IERC20::balanceOfCall { account: owner }.abi_encode();
	let output = client.call(token, data.into()).await?;
	IERC20::balanceOfCall::abi_decode_returns(&output)
		.map_err(|e| ChainError::Decode(e.to_string()))
}

pub async fn erc20_decimals(client: &dyn ChainClient, token: Address) -> Result<u8, ChainError> {
	let data = IERC20::decimalsCall {}.abi_encode();
	let output = client.call(token, data.into()).await?;
	IERC20::decimalsCall::abi_decode_returns(&output).map_err(|e| ChainError::Decode(e.to_string()))
}

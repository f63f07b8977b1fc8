//! Intent domain model.
//!
//! An intent pairs a [`Route`] (what must run on the destination chain) with a
//! [`Reward`] (what is paid on the source chain). Its identity is the content
//! hash of both halves, computed exactly as the intent source contract does.

use crate::contracts;
use crate::serde_helpers::bigint;
use crate::ChainId;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// An amount of a single ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
	pub token: Address,
	#[serde(with = "bigint")]
	pub amount: U256,
}

/// A call executed on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
	pub target: Address,
	pub data: Bytes,
	#[serde(with = "bigint")]
	pub value: U256,
}

impl Call {
	/// Calls without calldata are plain native transfers.
	pub fn is_function_call(&self) -> bool {
		!self.data.is_empty()
	}

	/// First four bytes of the calldata, when present.
	pub fn selector(&self) -> Option<[u8; 4]> {
		self.data.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
	}
}

/// Destination side of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
	pub salt: B256,
	#[serde(with = "bigint")]
	pub source: ChainId,
	#[serde(with = "bigint")]
	pub destination: ChainId,
	pub inbox: Address,
	pub tokens: Vec<TokenAmount>,
	pub calls: Vec<Call>,
}

impl Route {
	/// Calls that carry calldata.
	pub fn function_calls(&self) -> impl Iterator<Item = &Call> {
		self.calls.iter().filter(|c| c.is_function_call())
	}

	/// Distinct targets of the calls that carry calldata.
	pub fn function_targets(&self) -> Vec<Address> {
		let mut targets: Vec<Address> = self.function_calls().map(|c| c.target).collect();
		targets.sort();
		targets.dedup();
		targets
	}
}

/// Source side of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
	pub creator: Address,
	pub prover: Address,
	/// Unix timestamp in seconds.
	#[serde(with = "bigint")]
	pub deadline: u64,
	#[serde(with = "bigint")]
	pub native_value: U256,
	pub tokens: Vec<TokenAmount>,
}

/// A content-addressed cross-chain intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
	pub hash: B256,
	pub route: Route,
	pub reward: Reward,
	#[serde(with = "bigint")]
	pub log_index: u64,
	/// Set only for intents originated through gasless initiation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub funder: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quote_id: Option<String>,
}

impl Intent {
	/// Builds an intent, deriving its hash from the route and reward.
	pub fn new(route: Route, reward: Reward, log_index: u64) -> Self {
		let hash = intent_hash(&route, &reward);
		Self {
			hash,
			route,
			reward,
			log_index,
			funder: None,
			quote_id: None,
		}
	}

	/// True when any part of the intent moves the native gas token.
	pub fn is_native(&self) -> bool {
		!self.reward.native_value.is_zero() || self.route.calls.iter().any(|c| !c.value.is_zero())
	}

	/// The intent in its ABI form, as passed to intent source reads.
	pub fn to_abi(&self) -> contracts::Intent {
		contracts::Intent {
			route: (&self.route).into(),
			reward: (&self.reward).into(),
		}
	}
}

/// `keccak256(keccak256(abi.encode(route)) ++ keccak256(abi.encode(reward)))`
pub fn intent_hash(route: &Route, reward: &Reward) -> B256 {
	let route_hash = keccak256(contracts::Route::from(route).abi_encode());
	let reward_hash = keccak256(contracts::Reward::from(reward).abi_encode());

	let mut packed = [0u8; 64];
	packed[..32].copy_from_slice(route_hash.as_slice());
	packed[32..].copy_from_slice(reward_hash.as_slice());
	keccak256(packed)
}

impl From<&TokenAmount> for contracts::TokenAmount {
	fn from(value: &TokenAmount) -> Self {
		Self {
			token: value.token,
			amount: value.amount,
		}
	}
}

impl From<&Call> for contracts::Call {
	fn from(value: &Call) -> Self {
		Self {
			target: value.target,
			data: value.data.clone(),
			value: value.value,
		}
	}
}

impl From<&Route> for contracts::Route {
	fn from(value: &Route) -> Self {
		Self {
			salt: value.salt,
			source: U256::from(value.source),
			destination: U256::from(value.destination),
			inbox: value.inbox,
			tokens: value.tokens.iter().map(Into::into).collect(),
			calls: value.calls.iter().map(Into::into).collect(),
		}
	}
}

impl From<&Reward> for contracts::Reward {
	fn from(value: &Reward) -> Self {
		Self {
			creator: value.creator,
			prover: value.prover,
			deadline: U256::from(value.deadline),
			nativeValue: value.native_value,
			tokens: value.tokens.iter().map(Into::into).collect(),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::fixtures::{reward, route};
	use super::*;

	#[test]
	fn test_hash_depends_on_both_halves() {
		let base = Intent::new(route(), reward(), 0);

		let mut other_route = route();
		other_route.salt = B256::repeat_byte(0x12);
		assert_ne!(base.hash, intent_hash(&other_route, &reward()));

		let mut other_reward = reward();
		other_reward.deadline += 1;
		assert_ne!(base.hash, intent_hash(&route(), &other_reward));

		assert_eq!(base.hash, intent_hash(&route(), &reward()));
	}

	#[test]
	fn test_native_detection() {
		let mut intent = Intent::new(route(), reward(), 0);
		assert!(!intent.is_native());

		intent.route.calls[0].value = U256::from(1u64);
		assert!(intent.is_native());

		intent.route.calls[0].value = U256::ZERO;
		intent.reward.native_value = U256::from(5u64);
		assert!(intent.is_native());
	}

	#[test]
	fn test_function_targets_skip_plain_transfers() {
		let mut route = route();
		route.calls.push(Call {
			target: Address::repeat_byte(0x77),
			data: Bytes::new(),
			value: U256::from(1u64),
		});
		assert_eq!(route.function_targets(), vec![route.calls[0].target]);
		assert_eq!(route.calls[0].selector(), Some([0xa9, 0x05, 0x9c, 0xbb]));
		assert_eq!(route.calls[1].selector(), None);
	}

	#[test]
	fn test_serializes_wide_fields_as_bigint() {
		let intent = Intent::new(route(), reward(), 3);
		let value = serde_json::to_value(&intent).unwrap();
		assert_eq!(value["log_index"]["$bigint"], "3");
		assert_eq!(value["route"]["source"]["$bigint"], "10");
		assert_eq!(value["reward"]["tokens"][0]["amount"]["$bigint"], "1100000");
		assert!(value.get("funder").is_none());

		let back: Intent = serde_json::from_value(value).unwrap();
		assert_eq!(back, intent);
	}
}

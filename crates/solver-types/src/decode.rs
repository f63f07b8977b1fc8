//! Pure decoding of `IntentCreated` logs.

use crate::contracts::{self, IntentCreated};
use crate::intent::{intent_hash, Call, Reward, Route, TokenAmount};
use alloy::primitives::{Bytes, LogData, B256, U256};
use alloy::sol_types::SolEvent;
use thiserror::Error;

/// Errors that can occur while decoding an intent creation log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
	#[error("Log is not a valid IntentCreated event: {0}")]
	Abi(String),
	#[error("Value {0} does not fit in 64 bits")]
	Overflow(U256),
	#[error("Intent hash mismatch: event carries {event}, route and reward hash to {computed}")]
	HashMismatch { event: B256, computed: B256 },
}

/// The route and reward carried by an `IntentCreated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
	pub hash: B256,
	pub route: Route,
	pub reward: Reward,
}

/// Decodes an `IntentCreated` log from its raw data and topics.
///
/// Does not touch any client state. The hash in the indexed topic must match
/// the hash recomputed from the decoded route and reward.
pub fn decode_create_intent_log(data: &Bytes, topics: &[B256]) -> Result<DecodedEvent, DecodeError> {
	let log_data = LogData::new(topics.to_vec(), data.clone())
		.ok_or_else(|| DecodeError::Abi(format!("{} topics", topics.len())))?;
	let event =
		IntentCreated::decode_log_data(&log_data).map_err(|e| DecodeError::Abi(e.to_string()))?;

	let route = Route {
		salt: event.salt,
		source: to_u64(event.source)?,
		destination: to_u64(event.destination)?,
		inbox: event.inbox,
		tokens: event.routeTokens.iter().map(token_amount).collect(),
		calls: event
			.calls
			.iter()
			.map(|c| Call {
				target: c.target,
				data: c.data.clone(),
				value: c.value,
			})
			.collect(),
	};
	let reward = Reward {
		creator: event.creator,
		prover: event.prover,
		deadline: to_u64(event.deadline)?,
		native_value: event.nativeValue,
		tokens: event.rewardTokens.iter().map(token_amount).collect(),
	};

	let computed = intent_hash(&route, &reward);
	if computed != event.hash {
		return Err(DecodeError::HashMismatch {
			event: event.hash,
			computed,
		});
	}

	Ok(DecodedEvent {
		hash: event.hash,
		route,
		reward,
	})
}

fn token_amount(value: &contracts::TokenAmount) -> TokenAmount {
	TokenAmount {
		token: value.token,
		amount: value.amount,
	}
}

fn to_u64(value: U256) -> Result<u64, DecodeError> {
	u64::try_from(value).map_err(|_| DecodeError::Overflow(value))
}

/// Builds the raw data and topics an intent source would emit for
/// `route`/`reward`. Used by tests across the workspace.
pub fn encode_create_intent_log(route: &Route, reward: &Reward) -> (Bytes, Vec<B256>) {
	let abi_route = contracts::Route::from(route);
	let abi_reward = contracts::Reward::from(reward);
	let event = IntentCreated {
		hash: intent_hash(route, reward),
		salt: abi_route.salt,
		source: abi_route.source,
		destination: abi_route.destination,
		inbox: abi_route.inbox,
		routeTokens: abi_route.tokens,
		calls: abi_route.calls,
		creator: abi_reward.creator,
		prover: abi_reward.prover,
		deadline: abi_reward.deadline,
		nativeValue: abi_reward.nativeValue,
		rewardTokens: abi_reward.tokens,
	};
	let log_data = event.encode_log_data();
	(log_data.data.clone(), log_data.topics().to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::intent::fixtures::{reward, route};

	#[test]
	fn test_decodes_encoded_event() {
		let (data, topics) = encode_create_intent_log(&route(), &reward());
		assert_eq!(topics.len(), 4);
		assert_eq!(topics[0], IntentCreated::SIGNATURE_HASH);
		assert_eq!(topics[3], reward().prover.into_word());

		let decoded = decode_create_intent_log(&data, &topics).unwrap();
		assert_eq!(decoded.route, route());
		assert_eq!(decoded.reward, reward());
		assert_eq!(decoded.hash, intent_hash(&route(), &reward()));
	}

	#[test]
	fn test_rejects_foreign_signature() {
		let (data, mut topics) = encode_create_intent_log(&route(), &reward());
		topics[0] = B256::repeat_byte(0xff);
		assert!(matches!(
			decode_create_intent_log(&data, &topics),
			Err(DecodeError::Abi(_))
		));
	}

	#[test]
	fn test_rejects_tampered_hash_topic() {
		let (data, mut topics) = encode_create_intent_log(&route(), &reward());
		topics[1] = B256::repeat_byte(0x01);
		assert!(matches!(
			decode_create_intent_log(&data, &topics),
			Err(DecodeError::HashMismatch { .. })
		));
	}

	#[test]
	fn test_rejects_truncated_data() {
		let (data, topics) = encode_create_intent_log(&route(), &reward());
		let truncated = Bytes::from(data[..data.len() / 2].to_vec());
		assert!(decode_create_intent_log(&truncated, &topics).is_err());
	}
}

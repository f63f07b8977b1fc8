use crate::BASE_DECIMALS;
use alloy::primitives::I256;
use solver_types::{Address, ChainId, U256};

/// A token amount expressed in a known decimal base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedToken {
	pub chain_id: ChainId,
	pub address: Address,
	pub decimals: u8,
	pub balance: U256,
}

/// Rescales `value` from `from` decimals to `to` decimals. Scaling down
/// truncates.
pub fn normalize_balance(value: U256, from: u8, to: u8) -> U256 {
	if from == to {
		return value;
	}
	let factor = U256::from(10u64).pow(U256::from(from.abs_diff(to)));
	if to > from {
		value.saturating_mul(factor)
	} else {
		value / factor
	}
}

/// Signed variant of [`normalize_balance`]. Truncates toward zero.
pub fn normalize_signed(value: I256, from: u8, to: u8) -> I256 {
	let magnitude = I256::from_raw(normalize_balance(value.unsigned_abs(), from, to));
	if value.is_negative() {
		-magnitude
	} else {
		magnitude
	}
}

/// Converts `value`, held in `decimals`, into [`BASE_DECIMALS`].
pub fn convert_normalize(value: U256, chain_id: ChainId, address: Address, decimals: u8) -> NormalizedToken {
	NormalizedToken {
		chain_id,
		address,
		decimals: BASE_DECIMALS,
		balance: normalize_balance(value, decimals, BASE_DECIMALS),
	}
}

/// Converts a [`BASE_DECIMALS`] amount back to the token's `decimals`.
pub fn deconvert_normalize(value: U256, chain_id: ChainId, address: Address, decimals: u8) -> NormalizedToken {
	NormalizedToken {
		chain_id,
		address,
		decimals,
		balance: normalize_balance(value, BASE_DECIMALS, decimals),
	}
}

//! Serde helpers for values that cannot travel as plain JSON numbers.
//!
//! Integers are written as `{"$bigint": "<decimal>"}` so that 256-bit values
//! survive any JSON hop (job queue, storage) without precision loss, and so
//! that a reader can tell a big integer from an ordinary string.

/// Tagged decimal encoding for integer fields.
///
/// Use with `#[serde(with = "bigint")]` on `U256` or `u64` fields, or
/// `#[serde(with = "bigint::option")]` on optional ones.
pub mod bigint {
	use alloy::primitives::U256;
	use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

	/// Object key carrying the decimal digits.
	pub const TAG: &str = "$bigint";

	/// Integer types that can be written as a tagged decimal string.
	pub trait BigIntValue: Sized {
		fn to_decimal(&self) -> String;
		fn from_decimal(digits: &str) -> Result<Self, String>;
	}

	impl BigIntValue for U256 {
		fn to_decimal(&self) -> String {
			self.to_string()
		}

		fn from_decimal(digits: &str) -> Result<Self, String> {
			U256::from_str_radix(digits, 10).map_err(|e| format!("invalid bigint '{}': {}", digits, e))
		}
	}

	impl BigIntValue for u64 {
		fn to_decimal(&self) -> String {
			self.to_string()
		}

		fn from_decimal(digits: &str) -> Result<Self, String> {
			digits
				.parse()
				.map_err(|e| format!("invalid bigint '{}': {}", digits, e))
		}
	}

	#[derive(Serialize, Deserialize)]
	struct Tagged {
		#[serde(rename = "$bigint")]
		value: String,
	}

	pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
	where
		T: BigIntValue,
		S: Serializer,
	{
		Tagged {
			value: value.to_decimal(),
		}
		.serialize(serializer)
	}

	pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
	where
		T: BigIntValue,
		D: Deserializer<'de>,
	{
		let tagged = Tagged::deserialize(deserializer)?;
		T::from_decimal(&tagged.value).map_err(de::Error::custom)
	}

	/// Same encoding for `Option<T>`; `None` is written as `null`.
	pub mod option {
		use super::{BigIntValue, Tagged};
		use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

		pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
		where
			T: BigIntValue,
			S: Serializer,
		{
			value
				.as_ref()
				.map(|v| Tagged {
					value: v.to_decimal(),
				})
				.serialize(serializer)
		}

		pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
		where
			T: BigIntValue,
			D: Deserializer<'de>,
		{
			match Option::<Tagged>::deserialize(deserializer)? {
				Some(tagged) => T::from_decimal(&tagged.value)
					.map(Some)
					.map_err(de::Error::custom),
				None => Ok(None),
			}
		}
	}
}

use crate::IntentError;
use async_trait::async_trait;
use solver_types::{Address, ChainId};
use std::collections::HashSet;
use tracing::debug;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SmartWalletValidator: Send + Sync {
	/// Whether `address` is an approved smart wallet on `chain_id`.
	async fn validate_smart_wallet(&self, address: Address, chain_id: ChainId) -> Result<bool, IntentError>;
}

/// Approves wallets from a configured list, on every chain.
pub struct AllowListWalletValidator {
	allowed: HashSet<Address>,
}

impl AllowListWalletValidator {
	pub fn new(allowed: impl IntoIterator<Item = Address>) -> Self {
		Self {
			allowed: allowed.into_iter().collect(),
		}
	}
}

#[async_trait]
impl SmartWalletValidator for AllowListWalletValidator {
	async fn validate_smart_wallet(&self, address: Address, chain_id: ChainId) -> Result<bool, IntentError> {
		let valid = self.allowed.contains(&address);
		debug!(%address, chain_id, valid, "Smart wallet check");
		Ok(valid)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_allow_list() {
		let wallet = Address::repeat_byte(0xc1);
		let validator = AllowListWalletValidator::new([wallet]);
		assert!(validator.validate_smart_wallet(wallet, 10).await.unwrap());
		assert!(!validator
			.validate_smart_wallet(Address::repeat_byte(0xc2), 10)
			.await
			.unwrap());
	}
}

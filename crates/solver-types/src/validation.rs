//! Validation results recorded against an intent.

use serde::{Deserialize, Serialize};

/// Named admission predicates. An intent is admissible only when all hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationChecks {
	pub supported_prover: bool,
	pub supported_native: bool,
	pub supported_targets: bool,
	pub supported_transaction: bool,
	pub valid_transfer_limit: bool,
	pub valid_source_max: bool,
	pub valid_expiration_time: bool,
	pub valid_destination: bool,
	pub fulfill_on_different_chain: bool,
	pub sufficient_balance: bool,
	/// Folded in by the validator after the structural checks ran.
	pub intent_funded: bool,
}

impl ValidationChecks {
	/// Every structural predicate set, funding not yet observed.
	pub fn all_structural_passed() -> Self {
		Self {
			supported_prover: true,
			supported_native: true,
			supported_targets: true,
			supported_transaction: true,
			valid_transfer_limit: true,
			valid_source_max: true,
			valid_expiration_time: true,
			valid_destination: true,
			fulfill_on_different_chain: true,
			sufficient_balance: true,
			intent_funded: false,
		}
	}

	fn named(&self) -> [(&'static str, bool); 11] {
		[
			("supported_prover", self.supported_prover),
			("supported_native", self.supported_native),
			("supported_targets", self.supported_targets),
			("supported_transaction", self.supported_transaction),
			("valid_transfer_limit", self.valid_transfer_limit),
			("valid_source_max", self.valid_source_max),
			("valid_expiration_time", self.valid_expiration_time),
			("valid_destination", self.valid_destination),
			("fulfill_on_different_chain", self.fulfill_on_different_chain),
			("sufficient_balance", self.sufficient_balance),
			("intent_funded", self.intent_funded),
		]
	}

	pub fn passed(&self) -> bool {
		self.named().iter().all(|(_, ok)| *ok)
	}

	/// Names of the predicates that did not hold.
	pub fn failed_checks(&self) -> Vec<&'static str> {
		self.named()
			.into_iter()
			.filter(|(_, ok)| !ok)
			.map(|(name, _)| name)
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_predicate_must_hold() {
		let mut checks = ValidationChecks::all_structural_passed();
		assert!(!checks.passed());
		assert_eq!(checks.failed_checks(), vec!["intent_funded"]);

		checks.intent_funded = true;
		assert!(checks.passed());

		checks.valid_destination = false;
		checks.supported_prover = false;
		assert_eq!(
			checks.failed_checks(),
			vec!["supported_prover", "valid_destination"]
		);
	}
}

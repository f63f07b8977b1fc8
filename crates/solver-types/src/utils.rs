//! Display helpers.

/// Shortens a long hex identifier to `prefix...suffix` for log lines.
///
/// Identifiers of 12 characters or fewer are returned unchanged.
pub fn truncate_hash(hash: &str) -> String {
	match (hash.get(..6), hash.get(hash.len().saturating_sub(4)..)) {
		(Some(head), Some(tail)) if hash.len() > 12 => format!("{}...{}", head, tail),
		_ => hash.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::B256;

	#[test]
	fn test_truncate_hash() {
		let hash = B256::repeat_byte(0xcd).to_string();
		assert_eq!(truncate_hash(&hash), "0xcdcd...cdcd");
		assert_eq!(truncate_hash("0xabc"), "0xabc");
		assert_eq!(truncate_hash(""), "");
	}
}

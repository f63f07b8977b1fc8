//! ABI bindings for the intent source contract and ERC-20 tokens.
//!
//! These mirror the on-chain layout exactly; the domain model in
//! [`crate::intent`] converts into them for hashing and contract reads.

use alloy::sol;

sol! {
	struct TokenAmount {
		address token;
		uint256 amount;
	}

	struct Call {
		address target;
		bytes data;
		uint256 value;
	}

	struct Route {
		bytes32 salt;
		uint256 source;
		uint256 destination;
		address inbox;
		TokenAmount[] tokens;
		Call[] calls;
	}

	struct Reward {
		address creator;
		address prover;
		uint256 deadline;
		uint256 nativeValue;
		TokenAmount[] tokens;
	}

	struct Intent {
		Route route;
		Reward reward;
	}

	/// Emitted by the intent source when an intent is published on chain.
	event IntentCreated(
		bytes32 indexed hash,
		bytes32 salt,
		uint256 source,
		uint256 destination,
		address inbox,
		TokenAmount[] routeTokens,
		Call[] calls,
		address indexed creator,
		address indexed prover,
		uint256 deadline,
		uint256 nativeValue,
		TokenAmount[] rewardTokens
	);

	/// Whether the reward escrow for `intent` is fully funded.
	function isIntentFunded(Intent intent) external view returns (bool);

	interface IERC20 {
		function balanceOf(address account) external view returns (uint256);
		function decimals() external view returns (uint8);
		function transfer(address to, uint256 amount) external returns (bool);
	}
}

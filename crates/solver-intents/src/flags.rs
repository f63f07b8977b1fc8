use solver_config::FlagsConfig;

/// Named feature switches consulted at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
	/// Admit only intents whose creator is an approved smart wallet.
	BendWalletOnly,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait FeatureFlags: Send + Sync {
	fn flag(&self, flag: FeatureFlag) -> bool;
}

/// Flags fixed at startup from the `[flags]` section.
#[derive(Debug, Clone, Default)]
pub struct ConfigFlags {
	config: FlagsConfig,
}

impl ConfigFlags {
	pub fn new(config: FlagsConfig) -> Self {
		Self { config }
	}
}

impl FeatureFlags for ConfigFlags {
	fn flag(&self, flag: FeatureFlag) -> bool {
		match flag {
			FeatureFlag::BendWalletOnly => self.config.bend_wallet_only,
		}
	}
}

use crate::{Config, ConfigError};
use regex::Regex;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads, overrides and validates a [`Config`].
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SOLVER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", path);

		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(path.display().to_string())
			} else {
				ConfigError::Io(e)
			}
		})?;

		let content = substitute_env_vars(&content)?;
		let mut config = parse(path, &content)?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(path) = env::var(format!("{}STORAGE_PATH", self.env_prefix)) {
			debug!("Overriding storage path from environment");
			match config.storage.config.as_table_mut() {
				Some(table) => {
					table.insert("storage_path".to_string(), toml::Value::String(path));
				}
				None => {
					return Err(ConfigError::Validation(
						"storage.config must be a table".to_string(),
					))
				}
			}
		}

		let rpc_prefix = format!("{}RPC_URL_", self.env_prefix);
		for (key, url) in env::vars() {
			let Some(chain_id) = key.strip_prefix(&rpc_prefix) else {
				continue;
			};
			let chain_id: u64 = chain_id.parse().map_err(|_| {
				ConfigError::Validation(format!("Invalid chain id in {}", key))
			})?;
			if let Some(network) = config.networks.iter_mut().find(|n| n.chain_id == chain_id) {
				debug!("Overriding RPC URL for chain {} from environment", chain_id);
				network.rpc_url = url;
			}
		}

		Ok(())
	}
}

/// Replaces every `${VAR}` with the value of `VAR`.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Parse(e.to_string()))?;

	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let var_name = &cap[1];
		let value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result = result.replace(&cap[0], &value);
	}

	Ok(result)
}

fn parse(path: &Path, content: &str) -> Result<Config, ConfigError> {
	match path.extension().and_then(|s| s.to_str()) {
		Some("toml") => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
		Some("json") => {
			serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
		}
		Some("yaml") | Some("yml") => {
			serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
		}
		_ => Err(ConfigError::Parse(format!(
			"Unsupported config format: {:?}",
			path
		))),
	}
}

/// Checks cross references that serde cannot express.
pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let fail = |msg: String| Err(ConfigError::Validation(msg));

	if config.networks.is_empty() {
		return fail("At least one network must be configured".to_string());
	}

	let mut seen = HashSet::new();
	for network in &config.networks {
		if !seen.insert(network.chain_id) {
			return fail(format!("Network for chain {} configured twice", network.chain_id));
		}
	}

	for source in &config.intent_sources {
		if config.network(source.chain_id).is_none() {
			return fail(format!(
				"Intent source on chain {} has no network configured",
				source.chain_id
			));
		}
		if source.provers.is_empty() {
			return fail(format!(
				"Intent source on chain {} accepts no provers",
				source.chain_id
			));
		}
	}

	let mut seen = HashSet::new();
	for solver in &config.solvers {
		if config.network(solver.chain_id).is_none() {
			return fail(format!(
				"Solver on chain {} has no network configured",
				solver.chain_id
			));
		}
		if !seen.insert(solver.chain_id) {
			return fail(format!("Solver for chain {} configured twice", solver.chain_id));
		}
	}

	if config.chain_sync.max_block_range == 0 {
		return fail("chain_sync.max_block_range must be greater than 0".to_string());
	}
	if config.queue.attempts == 0 {
		return fail("queue.attempts must be greater than 0".to_string());
	}
	if config.queue.concurrency == 0 {
		return fail("queue.concurrency must be greater than 0".to_string());
	}

	Ok(())
}

//! Configuration for the intent admission pipeline.
//!
//! Configuration is read from a TOML, JSON or YAML file (chosen by
//! extension). `${VAR}` placeholders are replaced with environment values
//! before parsing, a small set of `SOLVER_`-prefixed variables override
//! parsed values, and the result is checked for internal consistency.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

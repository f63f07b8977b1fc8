use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solver_config::{Config, ConfigLoader};
use solver_core::SolverBuilder;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "oif-solver")]
#[command(about = "Cross-chain intent admission service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "SOLVER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start watching intent sources
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	info!("Loading configuration from: {:?}", cli.config);
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn start_service(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;
	info!(
		solver = %config.solver.id,
		sources = config.intent_sources.len(),
		destinations = ?config.supported_chains(),
		"Starting solver"
	);

	let engine = SolverBuilder::new(config)
		.build()
		.context("Failed to build solver")?;

	tokio::select! {
		result = engine.run() => {
			if let Err(e) = result {
				error!("Solver stopped: {}", e);
			}
		}
		_ = shutdown_signal() => {
			info!("Shutdown signal received");
		}
	}

	engine
		.shutdown()
		.await
		.context("Failed to shut down solver")?;
	info!("Solver stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;

	info!("Configuration is valid");
	info!("Solver: {} ({})", config.solver.id, config.solver.address);
	for source in &config.intent_sources {
		info!(
			"  Intent source: {} on chain {} ({} provers)",
			source.source_address,
			source.chain_id,
			source.provers.len()
		);
	}
	for solver in &config.solvers {
		info!(
			"  Solver: chain {} with {} targets",
			solver.chain_id,
			solver.targets.len()
		);
	}
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
		.context("Invalid log level")?;

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}

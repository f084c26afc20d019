//! # FluidRAG CLI
//!
//! Command-line front end for the document pipeline.
//!
//! Provides:
//! - Configuration loading and validation
//! - Full-pipeline submission with progress polling
//! - Stage-by-stage execution
//! - Resuming a poll from the last used document

mod cli;
mod commands;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::Layer;

use fluidrag_core::{load_config, load_config_from_env, validate_config, Config};

use cli::{Cli, Commands};
use commands::{run_artifact_url, run_pipeline, run_poll, run_stages, AppContext};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "fluidrag.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "FluidRAG CLI starting");

    let config = resolve_config(&cli)?;
    let ctx = AppContext::new(config)?;

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(&ctx, args).await,
        Commands::Poll(args) => run_poll(&ctx, args).await,
        Commands::Stages(args) => run_stages(&ctx, args).await,
        Commands::ArtifactUrl(args) => run_artifact_url(&ctx, args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Load, override and validate configuration.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_from(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            load_from(&PathBuf::from(DEFAULT_CONFIG_FILE))?
        }
        None => {
            debug!("No configuration file found, using defaults and environment");
            load_config_from_env().context("Failed to read configuration from environment")?
        }
    };

    if cli.offline {
        config.orchestrator.offline = true;
    }

    validate_config(&config).context("Configuration validation failed")?;
    info!(
        base_url = %config.orchestrator.base_url,
        offline = config.orchestrator.offline,
        "Configuration loaded"
    );
    Ok(config)
}

fn load_from(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    load_config(path).with_context(|| format!("Failed to load config from {:?}", path))
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        let default_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    // Logs on stderr, command output on stdout.
    let fmt_layer = match cli.log_format {
        cli::LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        cli::LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        cli::LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

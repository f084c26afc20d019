//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// FluidRAG - drive and observe the document pipeline from the terminal
#[derive(Parser, Debug)]
#[command(
    name = "fluidrag",
    author,
    version,
    about = "Drive and observe the FluidRAG document pipeline",
    long_about = "Submits documents to the pipeline orchestrator, steps through the\n\
                  upload, preprocess, headers and passes stages, and polls progress\n\
                  until per-pass results are available."
)]
pub struct Cli {
    /// Path to configuration file (defaults to ./fluidrag.toml when present)
    #[arg(short, long, global = true, env = "FLUIDRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Never contact the orchestrator
    #[arg(long, global = true)]
    pub offline: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FLUIDRAG_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FLUIDRAG_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a document for a full pipeline run, then poll for results
    Run(RunArgs),

    /// Poll progress for a document (defaults to the last one used)
    Poll(PollArgs),

    /// Run each pipeline stage in order, reporting stage state
    Stages(StagesArgs),

    /// Print the download URL for a stored artifact
    ArtifactUrl(ArtifactArgs),
}

/// Which document to process.
#[derive(Parser, Debug, Clone)]
pub struct SourceArgs {
    /// Document path or name
    pub source: String,

    /// Treat SOURCE as an existing file id rather than a path
    #[arg(long)]
    pub file_id: bool,
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Submit only; do not poll for results
    #[arg(long)]
    pub no_poll: bool,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `poll` command
#[derive(Parser, Debug, Clone)]
pub struct PollArgs {
    /// Document id (defaults to the last one submitted)
    pub doc_id: Option<String>,

    /// Override the poll interval from configuration (milliseconds)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `stages` command
#[derive(Parser, Debug, Clone)]
pub struct StagesArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Stop after this stage
    #[arg(long, value_enum, default_value = "passes")]
    pub until: StageArg,
}

/// Arguments for the `artifact-url` command
#[derive(Parser, Debug, Clone)]
pub struct ArtifactArgs {
    /// Artifact path as reported by the orchestrator
    pub path: String,
}

/// Pipeline stage selector
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageArg {
    Upload,
    Preprocess,
    Headers,
    Passes,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

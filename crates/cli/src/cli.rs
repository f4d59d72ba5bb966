//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shipper - batched event delivery to stream and search-index sinks
#[derive(Parser, Debug)]
#[command(
    name = "shipper",
    author,
    version,
    about = "Batched event shipper with partial retry",
    long_about = "Ships newline-delimited JSON events to stream-ingestion and bulk search-index sinks.\n\n\
                  Events are grouped into batches; items a sink rejects are retried on their own \n\
                  until they succeed or the attempt limit is reached."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SHIPPER_VERBOSE")]
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
        env = "SHIPPER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read NDJSON events and ship them to every configured sink
    Ship(ShipArgs),

    /// Validate configuration file without shipping
    Validate(ValidateArgs),
}

/// Arguments for the `ship` command
#[derive(Parser, Debug, Clone)]
pub struct ShipArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "shipper.toml",
        env = "SHIPPER_CONFIG"
    )]
    pub config: PathBuf,

    /// NDJSON input file ("-" or omitted reads stdin)
    #[arg(short, long, env = "SHIPPER_INPUT")]
    pub input: Option<PathBuf>,

    /// Override batching.batch_size from configuration
    #[arg(long, env = "SHIPPER_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Batches buffered between the reader and the dispatcher
    #[arg(long, default_value = "16", env = "SHIPPER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SHIPPER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and exit without shipping
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shipper.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

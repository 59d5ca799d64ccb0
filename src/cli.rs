//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

/// Hot-reloading mTLS credentials for the MOCO agent
#[derive(Parser, Debug)]
#[command(name = "moco-certreload")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MOCO_CERTRELOAD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding ca.crt, tls.crt and tls.key
    #[arg(long, global = true)]
    pub cert_dir: Option<PathBuf>,

    /// Poll interval (e.g. "1h", "30s")
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "MOCO_CERTRELOAD_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MOCO_CERTRELOAD_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to watch mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep the credentials loaded and reload them until terminated (default)
    Watch,

    /// Load the credentials once and print a summary of the leaf
    Check {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Output format of `check`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// Pretty-printed JSON
    Json,
}

//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// VM metadata server with VOMS attribute-certificate authentication
#[derive(Parser, Debug)]
#[command(name = "voms-metadata-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "VOMS_METADATA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "VOMS_METADATA_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "VOMS_METADATA_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "VOMS_METADATA_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "VOMS_METADATA_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the metadata server (default)
    Serve,

    /// VO policy management commands
    #[command(subcommand)]
    Policy(PolicyCommand),
}

/// Policy subcommands
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Validate a VO policy file and print the allow-list
    Check {
        /// Path to the policy JSON file
        #[arg(required = true)]
        file: PathBuf,
    },
}

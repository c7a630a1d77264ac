//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Load configuration with graceful fallback to defaults.
///
/// A missing or unparseable config file is reported and then ignored.
pub fn load_config() -> handoff_core::config::Config {
    handoff_core::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring configuration: {}", e);
        handoff_core::config::Config::default()
    })
}

pub mod config;
pub mod receive;
pub mod serve;

/// Handoff - send or receive a single file over TCP
#[derive(Parser)]
#[command(name = "handoff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Serve a file to every peer that connects
    Serve(ServeArgs),

    /// Download the file offered by a peer
    Receive(ReceiveArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

impl Command {
    /// Whether detailed logging was requested.
    pub const fn verbose(&self) -> bool {
        match self {
            Self::Serve(args) => args.verbose,
            Self::Receive(args) => args.verbose,
            Self::Config(_) => false,
        }
    }
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// File to serve
    pub file: PathBuf,

    /// Port to listen on (1024-65535, defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Address to bind (defaults to the configured address)
    #[arg(long)]
    pub bind: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Detailed logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Host name or IP address of the sender
    pub host: String,

    /// Port the sender listens on
    pub port: String,

    /// Output directory for the received file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Give up if a read stalls for this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep the partial `.part` file if the transfer fails
    #[arg(long)]
    pub keep_partial: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Detailed logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

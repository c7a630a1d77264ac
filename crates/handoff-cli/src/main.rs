//! Handoff CLI - send or receive a single file over TCP
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve a file
//! handoff serve ./report.pdf --port 50000
//!
//! # Download it (on another machine)
//! handoff receive 192.168.1.20 50000 --output ./downloads
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::struct_excessive_bools)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.command.verbose());

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if verbose {
        "warn,handoff=debug,handoff_core=debug"
    } else {
        "warn,handoff=info,handoff_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

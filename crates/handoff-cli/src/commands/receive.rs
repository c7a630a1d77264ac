//! Receive command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use handoff_core::connection::parse_port;
use handoff_core::file::format_size;
use handoff_core::progress::ChannelReporter;
use handoff_core::transfer;

use super::ReceiveArgs;
use crate::ui;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let global_config = super::load_config();

    let port = parse_port(&args.port).inspect_err(ui::print_error)?;

    let output_dir = args
        .output
        .clone()
        .or_else(|| global_config.receiver.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = global_config.to_transfer_config();
    if let Some(secs) = args.timeout {
        config.io_timeout = Some(Duration::from_secs(secs));
    }
    if args.keep_partial {
        config.remove_partial_on_failure = false;
    }

    if !args.quiet && !args.json {
        println!();
        println!("Handoff v{}", handoff_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received, cancelling download");
            trigger.cancel();
        }
    });

    let (reporter, rx) = ChannelReporter::new();
    let display = if !args.quiet && !args.json {
        Some(tokio::spawn(ui::display_notifications(rx)))
    } else {
        drop(rx);
        None
    };

    let start_time = Instant::now();
    let result = transfer::download_with_cancel(
        &args.host,
        port,
        &output_dir,
        config,
        Arc::new(reporter),
        cancel,
    )
    .await;
    let elapsed = start_time.elapsed();

    if let Some(display) = display {
        let _ = display.await;
    }

    match result {
        Ok(received) => {
            if args.json {
                let output = serde_json::json!({
                    "status": "complete",
                    "file": &received,
                    "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if !args.quiet {
                println!();
                println!("  Transfer complete!");
                println!();
                println!(
                    "  Saved {} ({}) in {:.1}s",
                    received.path.display(),
                    format_size(received.size),
                    elapsed.as_secs_f64()
                );
                println!();
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                let output = serde_json::json!({
                    "status": "failed",
                    "code": e.code(),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if !args.quiet {
                ui::print_error(&e);
            }
            Err(e.into())
        }
    }
}

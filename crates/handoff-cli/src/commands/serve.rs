//! Serve command implementation.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use handoff_core::connection::parse_listen_port;
use handoff_core::file::format_size;
use handoff_core::progress::ChannelReporter;
use handoff_core::transfer::{self, ListenerHandle};

use super::ServeArgs;
use crate::ui;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let global_config = super::load_config();

    let port = match args.port.as_deref() {
        Some(text) => parse_listen_port(text).inspect_err(ui::print_error)?,
        None => global_config.listener.port,
    };

    let mut config = global_config.to_transfer_config();
    if let Some(bind) = args.bind.clone() {
        config.bind_address = bind;
    }

    if !args.quiet && !args.json {
        println!();
        println!("Handoff v{}", handoff_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
    }

    let (reporter, rx) = ChannelReporter::new();
    let display = if !args.quiet && !args.json {
        Some(tokio::spawn(ui::display_notifications(rx)))
    } else {
        drop(rx);
        None
    };

    let handle = match transfer::start_listener(port, &args.file, config, Arc::new(reporter)).await
    {
        Ok(handle) => handle,
        Err(e) => {
            if let Some(display) = display {
                let _ = display.await;
            }
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
            return Err(e.into());
        }
    };

    let size = std::fs::metadata(handle.file_path()).map_or(0, |m| m.len());
    if args.json {
        let output = serde_json::json!({
            "status": "listening",
            "address": handle.local_addr().to_string(),
            "file": handle.file_path().display().to_string(),
            "size": size,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!(
            "  Serving {} ({}) on {}",
            handle.file_path().display(),
            format_size(size),
            handle.local_addr()
        );
        println!("  Press Ctrl-C to stop.");
        println!();
    }

    tokio::signal::ctrl_c().await?;
    tracing::debug!("Interrupt received, shutting down");

    transfer::stop_listener(&handle);
    if !args.quiet && !args.json {
        println!();
        println!("  Finishing transfers in progress. Press Ctrl-C again to quit now.");
    }

    let drained = drain_or_interrupt(handle, tokio::signal::ctrl_c()).await;
    if !drained {
        tracing::warn!("Second interrupt, exiting without waiting for transfers");
        return Ok(());
    }

    if let Some(display) = display {
        let _ = display.await;
    }

    if args.json {
        let output = serde_json::json!({ "status": "stopped" });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

/// Wait for a stopped listener to finish its transfers, unless `interrupt`
/// completes first. Returns whether the listener drained.
async fn drain_or_interrupt<F>(handle: ListenerHandle, interrupt: F) -> bool
where
    F: Future,
{
    tokio::select! {
        () = handle.shutdown() => true,
        _ = interrupt => false,
    }
}

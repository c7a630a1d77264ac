//! UI utilities for Handoff CLI.

use std::io::{self, Write};
use std::time::Instant;

use tokio::sync::mpsc;

use handoff_core::file::format_size;
use handoff_core::progress::{bytes_per_second, Notification, ProgressEvent};

const BAR_WIDTH: usize = 30;

/// Render a fixed-width bar for a percentage.
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = width * usize::from(percent.min(100)) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Render one progress line, e.g. `[#####-----]  50% 5.00 KB / 10.00 KB`.
pub fn progress_line(event: ProgressEvent, speed_bps: Option<u64>) -> String {
    let mut line = format!(
        "{} {:>3}% {} / {}",
        progress_bar(event.percent(), BAR_WIDTH),
        event.percent(),
        format_size(event.transferred),
        format_size(event.total)
    );
    if let Some(speed) = speed_bps {
        line.push_str(&format!(" - {}/s", format_size(speed)));
    }
    line
}

/// Print notifications until every sender is gone.
///
/// Log lines are printed as they come; progress redraws a single line.
pub async fn display_notifications(mut rx: mpsc::UnboundedReceiver<Notification>) {
    let mut on_progress_line = false;
    let mut started: Option<Instant> = None;

    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::Log(message) => {
                if on_progress_line {
                    println!();
                    on_progress_line = false;
                }
                println!("  {}", message);
            }
            Notification::Progress(event) => {
                let start = *started.get_or_insert_with(Instant::now);
                if event.transferred == 0 || event.is_complete() {
                    started = None;
                }
                print!("\r  {}    ", progress_line(event, speed(event, start)));
                let _ = io::stdout().flush();
                on_progress_line = true;
            }
        }
    }

    if on_progress_line {
        println!();
    }
}

fn speed(event: ProgressEvent, start: Instant) -> Option<u64> {
    match bytes_per_second(event.transferred, start.elapsed()) {
        0 => None,
        bps => Some(bps),
    }
}

/// Print an error with its code and, when there is one, a hint.
pub fn print_error(error: &handoff_core::Error) {
    eprintln!();
    eprintln!("  Transfer failed [{}]: {}", error.code(), error);
    if let Some(hint) = error.suggestion() {
        eprintln!();
        for line in hint.lines() {
            eprintln!("  {}", line.trim());
        }
    }
    eprintln!();
}

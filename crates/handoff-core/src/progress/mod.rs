//! Progress reporting.
//!
//! The transfer code never renders anything. It calls a [`ProgressReporter`]
//! with log lines and byte counts, and the caller decides where they go.
//!
//! Three reporters are provided:
//!
//! - [`TracingReporter`] - synchronous, forwards everything to `tracing`
//! - [`RecordingReporter`] - synchronous, keeps every call for later inspection
//! - [`ChannelReporter`] - posts [`Notification`]s to a channel so a UI loop
//!   can consume them on its own thread
//!
//! Reporters are invoked from the transfer task. An implementation that
//! drives a UI must hand the call over to the UI's own execution context.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

/// A snapshot of how far a transfer has come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Bytes moved so far
    pub transferred: u64,
    /// Total bytes in the body
    pub total: u64,
}

impl ProgressEvent {
    /// Create a new progress event.
    #[must_use]
    pub const fn new(transferred: u64, total: u64) -> Self {
        Self { transferred, total }
    }

    /// Whole percentage complete, rounded down. An empty body is 100%.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.transferred as u128 * 100) / self.total as u128;
        if pct > 100 {
            100
        } else {
            pct as u8
        }
    }

    /// Whether every byte has been moved.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }
}

/// Average throughput of `bytes` moved over `elapsed`, in bytes per second.
///
/// Returns 0 when no time has passed.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Receives log lines and progress updates from a transfer.
pub trait ProgressReporter: Send + Sync {
    /// A human-readable status or error line.
    fn on_log(&self, message: &str);

    /// Bytes moved after a chunk was written.
    fn on_progress(&self, event: ProgressEvent);
}

/// Forwards log lines to `tracing` at info level and progress at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_log(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn on_progress(&self, event: ProgressEvent) {
        tracing::trace!(
            "Progress: {}% ({}/{})",
            event.percent(),
            event.transferred,
            event.total
        );
    }
}

/// Keeps every log line and progress event it receives.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    logs: Mutex<Vec<String>>,
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All log lines received so far.
    pub fn logs(&self) -> Vec<String> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All progress events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent progress event.
    pub fn last_event(&self) -> Option<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_log(&self, message: &str) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }

    fn on_progress(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// A message posted by [`ChannelReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A log line
    Log(String),
    /// A progress update
    Progress(ProgressEvent),
}

/// Posts notifications to an unbounded channel and returns immediately.
///
/// The receiving half is drained wherever the caller renders output, so the
/// transfer task never waits on the UI.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelReporter {
    /// Create a reporter and the receiver its notifications arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_log(&self, message: &str) {
        let _ = self.tx.send(Notification::Log(message.to_string()));
    }

    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(Notification::Progress(event));
    }
}

/// Wraps a reporter so every log line also goes to `tracing`.
#[derive(Clone)]
pub(crate) struct Notifier {
    reporter: Arc<dyn ProgressReporter>,
}

impl Notifier {
    pub(crate) fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { reporter }
    }

    pub(crate) fn info(&self, message: &str) {
        tracing::info!("{message}");
        self.reporter.on_log(message);
    }

    pub(crate) fn warn(&self, message: &str) {
        tracing::warn!("{message}");
        self.reporter.on_log(message);
    }

    pub(crate) fn error(&self, message: &str) {
        tracing::error!("{message}");
        self.reporter.on_log(message);
    }

    pub(crate) fn progress(&self, event: ProgressEvent) {
        self.reporter.on_progress(event);
    }
}

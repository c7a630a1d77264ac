//! # Handoff Core Library
//!
//! `handoff-core` implements a minimal peer-to-peer file transfer: one side
//! listens on a TCP port and streams a single file to every peer that
//! connects, the other side dials in and writes the file to a directory.
//!
//! ## Modules
//!
//! - [`config`] - Persistent configuration
//! - [`connection`] - Host/port parsing and socket options
//! - [`error`] - Error taxonomy
//! - [`mod@file`] - Source validation, destination writer, name sanitizing
//! - [`progress`] - Progress events and notification sinks
//! - [`protocol`] - Header codec and wire layout
//! - [`transfer`] - Listener (sender) and connector (receiver)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use handoff_core::progress::TracingReporter;
//! use handoff_core::transfer::{self, TransferConfig};
//!
//! let reporter = Arc::new(TracingReporter);
//! let config = TransferConfig::default();
//! let handle =
//!     transfer::start_listener(50000, "report.pdf", config.clone(), reporter.clone()).await?;
//!
//! // On another machine
//! let received = transfer::download("192.168.1.20", 50000, "/tmp/out", config, reporter).await?;
//! println!("{} ({} bytes)", received.path.display(), received.size);
//!
//! handle.shutdown().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod connection;
pub mod error;
pub mod file;
pub mod progress;
pub mod protocol;
pub mod transfer;

pub use error::{Error, Result};
pub use progress::{ProgressEvent, ProgressReporter};
pub use protocol::FileHeader;
pub use transfer::{
    download, download_with_cancel, start_listener, stop_listener, ListenerHandle, ReceivedFile,
    TransferConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listening port
pub const DEFAULT_PORT: u16 = 50000;

/// Lowest port a listener may bind (unprivileged range)
pub const MIN_LISTEN_PORT: u16 = 1024;

/// Default chunk size for streaming the file body (8 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

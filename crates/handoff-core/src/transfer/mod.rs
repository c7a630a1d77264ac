//! File transfer engine for Handoff.
//!
//! - [`listener`] serves one file to every peer that connects
//! - [`connector`] dials a listener and writes the file to disk
//!
//! Both sides track a connection with a [`TransferSession`] and report
//! through a [`ProgressReporter`](crate::progress::ProgressReporter).

pub mod connector;
pub mod listener;

pub use connector::{download, download_with_cancel};
pub use listener::{start_listener, stop_listener, ListenerHandle};

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::progress::ProgressEvent;
use crate::protocol::FileHeader;

/// Configuration shared by the listener and the connector.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk size in bytes
    pub chunk_size: usize,
    /// Address the listener binds
    pub bind_address: String,
    /// How long the connector waits for the TCP dial
    pub connect_timeout: Duration,
    /// Deadline for a single read or write; `None` waits forever
    pub io_timeout: Option<Duration>,
    /// Enable TCP keep-alive on transfer sockets
    pub tcp_keepalive: bool,
    /// Delete the partial `.part` file when a download fails
    pub remove_partial_on_failure: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            bind_address: "0.0.0.0".to_string(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: None,
            tcp_keepalive: true,
            remove_partial_on_failure: true,
        }
    }
}

/// Which side of the protocol a session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// Listener streaming the file out
    Send,
    /// Connector writing the file to disk
    Receive,
}

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// TCP connection established
    Connected,
    /// Header written (sender) or read (receiver)
    HeaderExchanged,
    /// Body bytes are moving
    Streaming,
    /// Every declared byte was moved
    Completed,
    /// The connection was abandoned
    Failed,
}

impl TransferState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One accepted or dialed connection.
///
/// Owned by the task handling that connection and dropped with it.
#[derive(Debug)]
pub struct TransferSession {
    peer: SocketAddr,
    role: TransferRole,
    header: Option<FileHeader>,
    transferred: u64,
    state: TransferState,
    started_at: Instant,
}

impl TransferSession {
    /// Start tracking a freshly connected peer.
    #[must_use]
    pub fn new(peer: SocketAddr, role: TransferRole) -> Self {
        Self {
            peer,
            role,
            header: None,
            transferred: 0,
            state: TransferState::Connected,
            started_at: Instant::now(),
        }
    }

    /// Remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Which side this session is on.
    #[must_use]
    pub const fn role(&self) -> TransferRole {
        self.role
    }

    /// Header, once exchanged.
    #[must_use]
    pub const fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        self.state
    }

    /// Body bytes moved so far.
    #[must_use]
    pub const fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Declared body size, or 0 before the header is known.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.header.as_ref().map_or(0, |h| h.size)
    }

    /// Current progress.
    #[must_use]
    pub fn progress(&self) -> ProgressEvent {
        ProgressEvent::new(self.transferred, self.total())
    }

    /// Average throughput since the connection was made.
    #[must_use]
    pub fn speed_bps(&self) -> u64 {
        crate::progress::bytes_per_second(self.transferred, self.started_at.elapsed())
    }

    /// Record the header and move to [`TransferState::HeaderExchanged`].
    pub fn set_header(&mut self, header: FileHeader) {
        self.header = Some(header);
        self.transition(TransferState::HeaderExchanged);
    }

    /// Move to [`TransferState::Streaming`].
    pub fn begin_streaming(&mut self) {
        self.transition(TransferState::Streaming);
    }

    /// Count `bytes` more body bytes and return the event to emit.
    pub fn record(&mut self, bytes: u64) -> ProgressEvent {
        self.transferred += bytes;
        self.progress()
    }

    /// Move to [`TransferState::Completed`].
    pub fn complete(&mut self) {
        self.transition(TransferState::Completed);
    }

    /// Move to [`TransferState::Failed`].
    pub fn fail(&mut self) {
        self.transition(TransferState::Failed);
    }

    fn transition(&mut self, to: TransferState) {
        if self.state.is_terminal() || self.state == to {
            return;
        }
        tracing::debug!(
            "{:?} session with {}: {:?} -> {:?}",
            self.role,
            self.peer,
            self.state,
            to
        );
        self.state = to;
    }
}

/// A file written by a successful download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedFile {
    /// Absolute path of the written file
    pub path: PathBuf,
    /// File name as written (after sanitizing)
    pub name: String,
    /// Number of bytes written
    pub size: u64,
    /// Address of the sender
    pub peer: SocketAddr,
}

/// Run `fut`, failing with [`Error::Timeout`] if `limit` elapses first.
pub(crate) async fn with_io_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration))?,
        None => fut.await,
    }
}

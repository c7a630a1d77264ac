//! Error types for Handoff.
//!
//! One error type covers both roles. Validation variants are produced before
//! any socket or file is touched; the rest come from setup, the header
//! exchange, or the body stream.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for Handoff operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Handoff.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad caller input (empty host, non-numeric port, destination is a file)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Listener port outside the allowed range
    #[error("invalid port {0}: must be between {min} and 65535", min = crate::MIN_LISTEN_PORT)]
    InvalidPort(u32),

    /// Source file does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Source file exists but cannot be served
    #[error("cannot read file '{}': {reason}", path.display())]
    FileUnreadable {
        /// The file path
        path: PathBuf,
        /// Why it cannot be read
        reason: String,
    },

    /// Listening socket could not be bound
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// The requested port
        port: u16,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// TCP dial failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialed
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Malformed header on the wire
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Peer closed the connection before the declared size arrived
    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    TruncatedTransfer {
        /// Size declared in the header
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Source file read or destination file write failed
    #[error("file system error on '{}': {source}", path.display())]
    FileSystem {
        /// The file or directory involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Generic mid-stream socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read or write stalled past the configured deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Download was cancelled by the caller
    #[error("transfer cancelled")]
    TransferCancelled,

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Build a [`Error::FileSystem`] from a path and an I/O error.
    pub fn file_system(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Returns the short code for this error's taxonomy class.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidPort(_)
            | Self::FileNotFound(_)
            | Self::FileUnreadable { .. } => "E001",
            Self::Bind { .. } | Self::Connect { .. } => "E002",
            Self::ProtocolError(_) => "E003",
            Self::TruncatedTransfer { .. } => "E004",
            Self::FileSystem { .. } => "E005",
            Self::Io(_) | Self::Timeout(_) => "E006",
            Self::TransferCancelled => "E007",
            Self::ConfigError(_) => "E008",
        }
    }

    /// Returns whether the error was raised by input validation, i.e. before
    /// any network or disk resource was touched.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::InvalidPort(_)
                | Self::FileNotFound(_)
                | Self::FileUnreadable { .. }
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPort(_) => Some("Pick a port between 1024 and 65535, e.g. 50000."),
            Self::Bind { .. } => {
                Some("Another program is using this port. Stop it or choose a different port.")
            }
            Self::Connect { .. } => Some(
                "Check that the sender is running, the address and port are right,\n\
                 and that no firewall blocks the connection.",
            ),
            Self::TruncatedTransfer { .. } => {
                Some("The sender went away mid-transfer. Ask them to restart and try again.")
            }
            _ => None,
        }
    }
}

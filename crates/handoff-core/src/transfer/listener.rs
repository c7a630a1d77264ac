//! Sender side: serve one file to every peer that connects.
//!
//! The accept loop runs on its own task and hands each connection to a
//! per-connection task. [`ListenerHandle::stop`] clears the running flag and
//! wakes the loop, which then drops the listening socket so the port is free
//! again. Transfers already in progress run to completion or failure.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};

use super::{with_io_timeout, TransferConfig, TransferRole, TransferSession};
use crate::connection::{configure_tcp_keepalive, validate_listen_port};
use crate::error::{Error, Result};
use crate::file;
use crate::progress::{Notifier, ProgressReporter};
use crate::protocol::write_header;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct ServerState {
    running: AtomicBool,
    shutdown: Notify,
    file_path: PathBuf,
}

/// Handle to a running listener.
///
/// Dropping the handle stops the listener without waiting for it.
#[derive(Debug)]
pub struct ListenerHandle {
    state: Arc<ServerState>,
    local_addr: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop accepting connections.
    ///
    /// Returns immediately and may be called any number of times. The
    /// listening socket is closed as soon as the accept loop wakes up.
    pub fn stop(&self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("Stopping listener on {}", self.local_addr);
            self.state.shutdown.notify_one();
        }
    }

    /// Stop, then wait for the accept loop and every in-flight transfer to
    /// finish. The port is free once this returns.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Listener task ended abnormally: {}", e);
            }
        }
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the listener is still accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// The file being served.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.state.file_path
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start serving `file_path` on `port`.
///
/// The port and file are validated before anything is bound. Every peer that
/// connects receives the header followed by the whole file, until the
/// returned handle is stopped.
///
/// # Errors
///
/// Returns [`Error::InvalidPort`] for ports outside 1024-65535,
/// [`Error::FileNotFound`] or [`Error::FileUnreadable`] for a bad file, and
/// [`Error::Bind`] if the port cannot be bound.
pub async fn start_listener(
    port: u16,
    file_path: impl AsRef<Path>,
    config: TransferConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ListenerHandle> {
    let notifier = Notifier::new(reporter);
    let file_path = file_path.as_ref().to_path_buf();

    let port = validate_listen_port(u32::from(port))?;
    file::validate_source(&file_path).await?;
    file::source_name(&file_path)?;

    let listener = TcpListener::bind((config.bind_address.as_str(), port))
        .await
        .map_err(|source| Error::Bind { port, source })?;
    let local_addr = listener.local_addr()?;

    notifier.info(&format!("Server started on port {}", local_addr.port()));
    notifier.info("Waiting for connection...");

    let state = Arc::new(ServerState {
        running: AtomicBool::new(true),
        shutdown: Notify::new(),
        file_path,
    });

    let task = tokio::spawn(accept_loop(listener, Arc::clone(&state), config, notifier));

    Ok(ListenerHandle {
        state,
        local_addr,
        task: Some(task),
    })
}

/// Stop a listener. Equivalent to [`ListenerHandle::stop`].
pub fn stop_listener(handle: &ListenerHandle) {
    handle.stop();
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    config: TransferConfig,
    notifier: Notifier,
) {
    let mut connections = JoinSet::new();

    while state.running.load(Ordering::SeqCst) {
        tokio::select! {
            () = state.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    notifier.info(&format!("Client connected from: {peer}"));
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        state.file_path.clone(),
                        config.clone(),
                        notifier.clone(),
                    ));
                }
                Err(e) => {
                    if !state.running.load(Ordering::SeqCst) {
                        break;
                    }
                    notifier.warn(&format!("Failed to accept connection: {e}"));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Connection task ended abnormally: {}", e);
                }
            }
        }
    }

    drop(listener);
    notifier.info("Server stopped.");

    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Connection task ended abnormally: {}", e);
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    file_path: PathBuf,
    config: TransferConfig,
    notifier: Notifier,
) {
    if config.tcp_keepalive {
        if let Err(e) = configure_tcp_keepalive(&stream) {
            tracing::debug!("Could not enable keep-alive for {}: {}", peer, e);
        }
    }

    let mut session = TransferSession::new(peer, TransferRole::Send);
    match send_file(&mut stream, &file_path, &config, &mut session, &notifier).await {
        Ok(()) => {
            session.complete();
            tracing::debug!(
                "Sent {} to {} at {}/s",
                file::format_size(session.transferred()),
                peer,
                file::format_size(session.speed_bps())
            );
            notifier.info("File sent successfully!");
        }
        Err(e) => {
            session.fail();
            notifier.warn(&format!("Transfer to {peer} failed: {e}"));
        }
    }
}

/// Write the header and body of `file_path` to `writer`, then close it.
pub(crate) async fn send_file<W>(
    writer: &mut W,
    file_path: &Path,
    config: &TransferConfig,
    session: &mut TransferSession,
    notifier: &Notifier,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (source, header) = file::open_source(file_path).await?;
    let size = header.size;

    with_io_timeout(config.io_timeout, write_header(writer, &header)).await?;
    session.set_header(header);

    send_body(writer, source, file_path, size, config, session, notifier).await?;

    with_io_timeout(config.io_timeout, async {
        writer.flush().await?;
        writer.shutdown().await?;
        Ok::<(), Error>(())
    })
    .await
}

async fn send_body<R, W>(
    writer: &mut W,
    mut source: R,
    source_path: &Path,
    size: u64,
    config: &TransferConfig,
    session: &mut TransferSession,
    notifier: &Notifier,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut remaining = size;

    session.begin_streaming();
    if size == 0 {
        notifier.progress(session.progress());
    }

    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = source
            .read(&mut buf[..want])
            .await
            .map_err(|e| Error::file_system(source_path, e))?;
        if n == 0 {
            return Err(Error::file_system(
                source_path,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file shrank while being sent, {remaining} bytes missing"),
                ),
            ));
        }

        let chunk = &buf[..n];
        with_io_timeout(config.io_timeout, async {
            writer.write_all(chunk).await?;
            Ok::<(), Error>(())
        })
        .await?;

        remaining -= n as u64;
        notifier.progress(session.record(n as u64));
    }

    Ok(())
}

//! Receiver side: dial a listener and write the offered file to disk.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::{with_io_timeout, ReceivedFile, TransferConfig, TransferRole, TransferSession};
use crate::connection::{configure_tcp_keepalive, dial, format_addr, validate_host};
use crate::error::{Error, Result};
use crate::file::{self, FileWriter};
use crate::progress::{Notifier, ProgressReporter};
use crate::protocol::read_header;

/// Download the file offered at `host:port` into `dest_dir`.
///
/// The destination file is named after the (sanitized) name in the header.
/// The body is written to `<name>.part` and only replaces an existing file of
/// the same name once every byte has arrived.
///
/// # Errors
///
/// See [`download_with_cancel`].
pub async fn download(
    host: &str,
    port: u16,
    dest_dir: impl AsRef<Path>,
    config: TransferConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ReceivedFile> {
    download_with_cancel(
        host,
        port,
        dest_dir,
        config,
        reporter,
        CancellationToken::new(),
    )
    .await
}

/// Download the file offered at `host:port`, giving up when `cancel` fires.
///
/// The token is checked while dialing and between chunk reads.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for an empty host, port 0 or an unusable
///   destination, before any connection is made
/// - [`Error::Connect`] if the listener cannot be reached
/// - [`Error::ProtocolError`] for a malformed header
/// - [`Error::TruncatedTransfer`] if the stream ends early
/// - [`Error::FileSystem`] if the destination cannot be written
/// - [`Error::TransferCancelled`] if `cancel` fires first
///
/// On any error after the partial file was created, it is removed (unless
/// [`TransferConfig::remove_partial_on_failure`] is off). An existing file
/// with the target name is left untouched.
pub async fn download_with_cancel(
    host: &str,
    port: u16,
    dest_dir: impl AsRef<Path>,
    config: TransferConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
) -> Result<ReceivedFile> {
    let notifier = Notifier::new(reporter);

    let result = run_download(host, port, dest_dir.as_ref(), &config, &notifier, &cancel).await;
    if let Err(ref e) = result {
        notifier.error(&format!("Error: {e}"));
    }
    result
}

async fn run_download(
    host: &str,
    port: u16,
    dest_dir: &Path,
    config: &TransferConfig,
    notifier: &Notifier,
    cancel: &CancellationToken,
) -> Result<ReceivedFile> {
    let host = validate_host(host)?;
    if port == 0 {
        return Err(Error::InvalidInput(
            "Invalid port '0'. Port must be a number between 1 and 65535".to_string(),
        ));
    }
    file::validate_destination_dir(dest_dir)?;

    notifier.info(&format!("Connecting to {}...", format_addr(host, port)));
    let mut stream = tokio::select! {
        () = cancel.cancelled() => return Err(Error::TransferCancelled),
        dialed = dial(host, port, config.connect_timeout) => dialed?,
    };
    let peer = stream.peer_addr()?;
    if config.tcp_keepalive {
        if let Err(e) = configure_tcp_keepalive(&stream) {
            tracing::debug!("Could not enable keep-alive for {}: {}", peer, e);
        }
    }
    notifier.info("Connected to sender.");

    let mut session = TransferSession::new(peer, TransferRole::Receive);
    let header = tokio::select! {
        () = cancel.cancelled() => return Err(Error::TransferCancelled),
        header = with_io_timeout(config.io_timeout, read_header(&mut stream)) => header?,
    };

    let name = file::sanitize_file_name(&header.name).ok_or_else(|| {
        Error::ProtocolError(format!("unusable file name '{}'", header.name.escape_debug()))
    })?;
    if name != header.name {
        tracing::debug!("Sanitized file name {:?} to {:?}", header.name, name);
    }
    let target = dest_dir.join(&name);
    if target.parent() != Some(dest_dir) {
        return Err(Error::ProtocolError(format!(
            "file name '{}' escapes the destination directory",
            name.escape_debug()
        )));
    }
    let size = header.size;
    session.set_header(header);

    notifier.info(&format!("Receiving file: {name}"));
    notifier.info(&format!("File size: {}", file::format_size(size)));

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| Error::file_system(dest_dir, e))?;
    let mut writer = FileWriter::new(target, size).await?;
    let part_path = writer.part_path().to_path_buf();

    let received =
        receive_body(&mut stream, &mut writer, config, &mut session, notifier, cancel).await;
    if let Err(e) = received {
        session.fail();
        if config.remove_partial_on_failure {
            writer.discard().await;
        } else {
            writer.keep().await;
        }
        return Err(e);
    }

    let written = match writer.finalize().await {
        Ok(path) => path,
        Err(e) => {
            session.fail();
            if config.remove_partial_on_failure {
                file::remove_partial(&part_path).await;
            }
            return Err(e);
        }
    };
    session.complete();
    tracing::debug!(
        "Received {} from {} at {}/s",
        file::format_size(size),
        peer,
        file::format_size(session.speed_bps())
    );

    let path = std::path::absolute(&written).unwrap_or(written);
    notifier.info(&format!("File received successfully: {}", path.display()));

    Ok(ReceivedFile {
        path,
        name,
        size,
        peer,
    })
}

/// Copy exactly `writer.expected_size()` body bytes from `reader` to disk.
pub(crate) async fn receive_body<R>(
    reader: &mut R,
    writer: &mut FileWriter,
    config: &TransferConfig,
    session: &mut TransferSession,
    notifier: &Notifier,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let expected = writer.expected_size();
    let mut buf = vec![0u8; config.chunk_size.max(1)];

    session.begin_streaming();
    if expected == 0 {
        notifier.progress(session.progress());
        return Ok(());
    }

    while writer.bytes_written() < expected {
        if cancel.is_cancelled() {
            return Err(Error::TransferCancelled);
        }

        let remaining = expected - writer.bytes_written();
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));

        let n = tokio::select! {
            () = cancel.cancelled() => return Err(Error::TransferCancelled),
            read = with_io_timeout(config.io_timeout, async {
                Ok::<usize, Error>(reader.read(&mut buf[..want]).await?)
            }) => read?,
        };
        if n == 0 {
            return Err(Error::TruncatedTransfer {
                expected,
                received: writer.bytes_written(),
            });
        }

        writer.write_chunk(&buf[..n]).await?;
        notifier.progress(session.record(n as u64));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ProgressEvent, RecordingReporter};
    use crate::transfer::TransferState;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn session(size: u64) -> TransferSession {
        let mut session = TransferSession::new(
            "127.0.0.1:50000".parse().expect("addr"),
            TransferRole::Receive,
        );
        session.set_header(crate::protocol::FileHeader::new("data.bin", size).expect("header"));
        session
    }

    #[tokio::test]
    async fn test_receive_body_exact() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("data.bin");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 97) as u8).collect();

        let recorder = Arc::new(RecordingReporter::new());
        let notifier = Notifier::new(recorder.clone());
        let mut writer = FileWriter::new(output.clone(), 20_000).await.expect("writer");
        let mut session = session(20_000);

        receive_body(
            &mut Cursor::new(data.clone()),
            &mut writer,
            &TransferConfig::default(),
            &mut session,
            &notifier,
            &CancellationToken::new(),
        )
        .await
        .expect("receive");
        writer.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&output).expect("read"), data);
        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ProgressEvent::new(8192, 20_000));
        assert_eq!(events[2], ProgressEvent::new(20_000, 20_000));
    }

    #[tokio::test]
    async fn test_receive_body_ignores_trailing_bytes() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let output = temp_dir.path().join("data.bin");
        let notifier = Notifier::new(Arc::new(RecordingReporter::new()));
        let mut writer = FileWriter::new(output.clone(), 4).await.expect("writer");

        receive_body(
            &mut Cursor::new(b"abcdEXTRA".to_vec()),
            &mut writer,
            &TransferConfig::default(),
            &mut session(4),
            &notifier,
            &CancellationToken::new(),
        )
        .await
        .expect("receive");
        writer.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&output).expect("read"), b"abcd");
    }

    #[tokio::test]
    async fn test_receive_body_truncated() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let notifier = Notifier::new(Arc::new(RecordingReporter::new()));
        let mut writer = FileWriter::new(temp_dir.path().join("data.bin"), 100)
            .await
            .expect("writer");
        let mut session = session(100);

        let result = receive_body(
            &mut Cursor::new(vec![7u8; 60]),
            &mut writer,
            &TransferConfig::default(),
            &mut session,
            &notifier,
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::TruncatedTransfer {
                expected: 100,
                received: 60
            })
        ));
        assert_eq!(session.state(), TransferState::Streaming);
    }

    #[tokio::test]
    async fn test_receive_body_empty_emits_final_event() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let recorder = Arc::new(RecordingReporter::new());
        let notifier = Notifier::new(recorder.clone());
        let mut writer = FileWriter::new(temp_dir.path().join("empty.txt"), 0)
            .await
            .expect("writer");

        receive_body(
            &mut Cursor::new(Vec::new()),
            &mut writer,
            &TransferConfig::default(),
            &mut session(0),
            &notifier,
            &CancellationToken::new(),
        )
        .await
        .expect("receive");

        assert_eq!(recorder.events(), vec![ProgressEvent::new(0, 0)]);
        assert_eq!(recorder.last_event().map(|e| e.percent()), Some(100));
    }

    #[tokio::test]
    async fn test_receive_body_cancelled() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let notifier = Notifier::new(Arc::new(RecordingReporter::new()));
        let mut writer = FileWriter::new(temp_dir.path().join("data.bin"), 10)
            .await
            .expect("writer");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = receive_body(
            &mut Cursor::new(vec![0u8; 10]),
            &mut writer,
            &TransferConfig::default(),
            &mut session(10),
            &notifier,
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(Error::TransferCancelled)));
        assert_eq!(writer.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_download_rejects_bad_input_before_connecting() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let recorder = Arc::new(RecordingReporter::new());

        let result = download(
            "",
            50000,
            temp_dir.path(),
            TransferConfig::default(),
            recorder.clone(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = download(
            "127.0.0.1",
            0,
            temp_dir.path(),
            TransferConfig::default(),
            recorder.clone(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        assert!(!recorder
            .logs()
            .iter()
            .any(|line| line.starts_with("Connecting")));
    }
}

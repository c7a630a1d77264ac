//! Handoff wire protocol.
//!
//! The sender writes one header followed by the raw file body, then closes
//! the connection. The receiver never writes protocol bytes back.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────────┐
//! │ name_length  │     name     │  file_size   │    file body     │
//! │ 2 bytes (BE) │ N bytes UTF-8│ 8 bytes (BE) │     S bytes      │
//! └──────────────┴──────────────┴──────────────┴──────────────────┘
//! ```
//!
//! There is no handshake, acknowledgement, version field or checksum.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of the name length prefix in bytes
pub const NAME_LENGTH_SIZE: usize = 2;

/// Size of the file size field in bytes
pub const FILE_SIZE_SIZE: usize = 8;

/// Longest name the length prefix can describe
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// Metadata sent ahead of the file body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Bare file name (no path separators)
    pub name: String,
    /// Exact byte length of the body that follows
    pub size: u64,
}

impl FileHeader {
    /// Create a header, checking that the name fits the length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is empty or longer than
    /// [`MAX_NAME_LENGTH`] bytes once encoded.
    pub fn new(name: impl Into<String>, size: u64) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput("file name is empty".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidInput(format!(
                "file name is {} bytes, the protocol allows at most {MAX_NAME_LENGTH}",
                name.len()
            )));
        }
        Ok(Self { name, size })
    }

    /// Number of bytes the encoded header occupies.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        NAME_LENGTH_SIZE + self.name.len() + FILE_SIZE_SIZE
    }

    /// Encode the header to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the name does not fit the 2-byte length prefix.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name_len = u16::try_from(self.name.len()).map_err(|_| {
            Error::InvalidInput(format!(
                "file name is {} bytes, the protocol allows at most {MAX_NAME_LENGTH}",
                self.name.len()
            ))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&name_len.to_be_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.size.to_be_bytes());
        Ok(buf)
    }

    /// Decode a header from the start of `buf`.
    ///
    /// Returns the header and the number of bytes consumed; anything after
    /// that belongs to the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] if the buffer is truncated, the name
    /// length is inconsistent with the remaining bytes, or the name is not
    /// valid UTF-8.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < NAME_LENGTH_SIZE {
            return Err(Error::ProtocolError(format!(
                "truncated header: {} bytes, need at least {NAME_LENGTH_SIZE}",
                buf.len()
            )));
        }

        let name_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let total = NAME_LENGTH_SIZE + name_len + FILE_SIZE_SIZE;
        if buf.len() < total {
            return Err(Error::ProtocolError(format!(
                "name length {name_len} inconsistent with {} remaining header bytes",
                buf.len() - NAME_LENGTH_SIZE
            )));
        }

        let name_end = NAME_LENGTH_SIZE + name_len;
        let name = decode_name(&buf[NAME_LENGTH_SIZE..name_end])?;

        let mut size_bytes = [0u8; FILE_SIZE_SIZE];
        size_bytes.copy_from_slice(&buf[name_end..total]);
        let size = u64::from_be_bytes(size_bytes);

        Ok((Self { name, size }, total))
    }
}

fn decode_name(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::ProtocolError("empty file name".to_string()));
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::ProtocolError(format!("file name is not valid UTF-8: {e}")))
}

/// Map an end-of-stream while reading the header to a protocol error.
fn header_read_error(e: std::io::Error, what: &str) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ProtocolError(format!("truncated header: connection closed while reading {what}"))
    } else {
        Error::Io(e)
    }
}

/// Read a header from a stream.
///
/// # Errors
///
/// Returns [`Error::ProtocolError`] if the stream ends inside the header or
/// the name is malformed, and [`Error::Io`] for other read failures.
pub async fn read_header<R>(reader: &mut R) -> Result<FileHeader>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; NAME_LENGTH_SIZE];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| header_read_error(e, "name length"))?;
    let name_len = u16::from_be_bytes(len_buf) as usize;

    let mut name_buf = vec![0u8; name_len];
    reader
        .read_exact(&mut name_buf)
        .await
        .map_err(|e| header_read_error(e, "file name"))?;
    let name = decode_name(&name_buf)?;

    let mut size_buf = [0u8; FILE_SIZE_SIZE];
    reader
        .read_exact(&mut size_buf)
        .await
        .map_err(|e| header_read_error(e, "file size"))?;

    Ok(FileHeader {
        name,
        size: u64::from_be_bytes(size_buf),
    })
}

/// Write a header to a stream.
///
/// # Errors
///
/// Returns an error if the header cannot be encoded or writing fails.
pub async fn write_header<W>(writer: &mut W, header: &FileHeader) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let buf = header.encode()?;
    writer.write_all(&buf).await?;
    Ok(())
}

//! Connection utilities.
//!
//! Parsing of host/port input as typed by a user, TCP keep-alive, and the
//! dial used by the connector.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Parse a port typed by a user.
///
/// Leading and trailing whitespace is ignored. Any value that fits a TCP port
/// other than 0 is accepted; listeners apply the stricter
/// [`validate_listen_port`] on top.
///
/// # Examples
///
/// ```
/// use handoff_core::connection::parse_port;
///
/// assert_eq!(parse_port(" 50000 ").unwrap(), 50000);
/// assert!(parse_port("abc").is_err());
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the text is empty, not a number, or
/// out of range.
pub fn parse_port(text: &str) -> Result<u16> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("port is empty".to_string()));
    }

    let port: u16 = text.parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid port '{text}'. Port must be a number between 1 and 65535"
        ))
    })?;

    if port == 0 {
        return Err(Error::InvalidInput(
            "Invalid port '0'. Port must be a number between 1 and 65535".to_string(),
        ));
    }

    Ok(port)
}

/// Check that a listener port lies in the unprivileged range.
///
/// # Errors
///
/// Returns [`Error::InvalidPort`] if `port` is below
/// [`MIN_LISTEN_PORT`](crate::MIN_LISTEN_PORT) or above 65535.
pub fn validate_listen_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p >= crate::MIN_LISTEN_PORT => Ok(p),
        _ => Err(Error::InvalidPort(port)),
    }
}

/// Parse and range-check a listener port typed by a user.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for non-numeric text and
/// [`Error::InvalidPort`] for numbers outside 1024-65535.
pub fn parse_listen_port(text: &str) -> Result<u16> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("port is empty".to_string()));
    }
    let port: u32 = text
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid port '{text}'")))?;
    validate_listen_port(port)
}

/// Check that a host string is usable for dialing.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the host is empty or contains
/// whitespace.
pub fn validate_host(host: &str) -> Result<&str> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::InvalidInput("host is empty".to_string()));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(Error::InvalidInput(format!(
            "Invalid host '{host}': contains whitespace"
        )));
    }
    Ok(host)
}

/// Format a host and port as a dialable address, bracketing bare IPv6.
#[must_use]
pub fn format_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Configure TCP keep-alive on a socket.
///
/// Probing starts after 10 seconds of idle time and repeats every 5 seconds,
/// so a vanished peer is noticed even while a read is blocked.
pub fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Open a TCP connection to `host:port` within `timeout`.
///
/// # Errors
///
/// Returns [`Error::Connect`] if resolution or the dial fails, or the
/// timeout expires.
pub async fn dial(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = format_addr(host, port);
    let bare_host = host.trim_start_matches('[').trim_end_matches(']');

    match tokio::time::timeout(timeout, TcpStream::connect((bare_host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(Error::Connect { addr, source }),
        Err(_) => Err(Error::Connect {
            addr,
            source: std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no answer after {} seconds", timeout.as_secs()),
            ),
        }),
    }
}

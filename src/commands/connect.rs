//! CONNECT / STOMP
//!
//! Negotiates the protocol version from the client's `accept-version`
//! header and answers with `CONNECTED`, or with an `ERROR` frame when none
//! of the offered versions is supported.
//!
//! ```text
//! CONNECT                      CONNECTED
//! accept-version:1.1,1.2  ──>  version:1.2
//! host:localhost               server:kazusa/0.1.0
//!
//! ^@                           ^@
//! ```

use crate::commands::dispatch::{iterate_headers, HeaderError, HeaderHandler};
use crate::protocol::reply::FRAME_END;
use crate::protocol::{send_error, send_msg, Frame};
use tracing::{debug, info, warn};

/// Protocol versions the broker speaks, oldest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];

/// Version assumed when the client sends no `accept-version` header.
pub const DEFAULT_VERSION: &str = "1.0";

/// What the client asked for in its CONNECT headers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Highest mutually supported version, if `accept-version` was sent
    pub version: Option<&'static str>,
    /// Virtual host named by the client
    pub host: Option<String>,
}

impl ConnectRequest {
    /// The version to answer with.
    pub fn negotiated_version(&self) -> &'static str {
        self.version.unwrap_or(DEFAULT_VERSION)
    }
}

fn on_accept_version(value: &str, req: &mut ConnectRequest) -> Result<(), HeaderError> {
    let offered: Vec<&str> = value.split(',').map(str::trim).collect();
    let best = SUPPORTED_VERSIONS
        .iter()
        .rev()
        .copied()
        .find(|v| offered.contains(v));

    match best {
        Some(version) => {
            req.version = Some(version);
            Ok(())
        }
        None => Err(HeaderError::UnsupportedVersion(value.to_string())),
    }
}

fn on_host(value: &str, req: &mut ConnectRequest) -> Result<(), HeaderError> {
    req.host = Some(value.to_string());
    Ok(())
}

const CONNECT_HEADERS: &[HeaderHandler<ConnectRequest>] = &[
    HeaderHandler::new("accept-version:", on_accept_version),
    HeaderHandler::new("host:", on_host),
];

/// Parses the CONNECT headers of `frame`.
pub fn parse_connect(frame: &Frame) -> Result<ConnectRequest, HeaderError> {
    let mut req = ConnectRequest::default();
    iterate_headers(frame.headers(), CONNECT_HEADERS, &mut req)?;
    Ok(req)
}

/// Handles a CONNECT (or STOMP) frame.
pub fn handle_connect(frame: &Frame) {
    let conn = frame.connection();

    let sent = match parse_connect(frame) {
        Ok(req) => {
            let version = req.negotiated_version();
            info!(
                connection = %conn.id(),
                version = version,
                host = req.host.as_deref().unwrap_or("-"),
                "Client connected"
            );
            send_msg(
                conn,
                &[
                    "CONNECTED\n",
                    "version:",
                    version,
                    "\n",
                    "server:kazusa/",
                    crate::VERSION,
                    "\n",
                    "\n",
                    FRAME_END,
                ],
            )
        }
        Err(e) => {
            warn!(connection = %conn.id(), error = %e, "Rejecting CONNECT");
            let body = format!(
                "{}\nSupported protocol versions are {}\n",
                e,
                SUPPORTED_VERSIONS.join(",")
            );
            send_error(conn, &body)
        }
    };

    if let Err(e) = sent {
        debug!(error = %e, "CONNECT reply not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::FrameBucket;
    use crate::protocol::{ConnectionHandle, ConnectionId, FrameAssembler};
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn connect_frame(headers: &[&str]) -> (Frame, mpsc::UnboundedReceiver<Bytes>) {
        let bucket = Arc::new(FrameBucket::new());
        let assembler = FrameAssembler::new(Arc::clone(&bucket));
        let (conn, rx) = ConnectionHandle::channel(ConnectionId::new(1));
        let mut slot = None;

        assembler.feed(&conn, b"CONNECT", &mut slot).unwrap();
        for header in headers {
            assembler.feed(&conn, header.as_bytes(), &mut slot).unwrap();
        }
        assembler.feed(&conn, b"\n", &mut slot).unwrap();
        assembler.feed(&conn, b"", &mut slot).unwrap();

        (bucket.dequeue().unwrap(), rx)
    }

    #[test]
    fn test_parse_connect_headers() {
        let (frame, _rx) = connect_frame(&["accept-version:1.0,1.1", "host:localhost"]);
        let req = parse_connect(&frame).unwrap();
        assert_eq!(req.version, Some("1.1"));
        assert_eq!(req.host.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_missing_accept_version_defaults() {
        let (frame, _rx) = connect_frame(&["host:localhost"]);
        let req = parse_connect(&frame).unwrap();
        assert_eq!(req.version, None);
        assert_eq!(req.negotiated_version(), "1.0");
    }

    #[test]
    fn test_unsupported_version() {
        let (frame, _rx) = connect_frame(&["accept-version:2.0,3.0"]);
        assert_eq!(
            parse_connect(&frame),
            Err(HeaderError::UnsupportedVersion("2.0,3.0".to_string()))
        );
    }

    #[test]
    fn test_handle_connect_replies_connected() {
        let (frame, mut rx) = connect_frame(&["accept-version:1.2", "host:localhost"]);
        handle_connect(&frame);

        let reply = rx.try_recv().unwrap();
        let expected = format!("CONNECTED\nversion:1.2\nserver:kazusa/{}\n\n\0", crate::VERSION);
        assert_eq!(reply, Bytes::from(expected));
    }

    #[test]
    fn test_handle_connect_replies_error() {
        let (frame, mut rx) = connect_frame(&["accept-version:9.9"]);
        handle_connect(&frame);

        let reply = rx.try_recv().unwrap();
        let text = String::from_utf8(reply.to_vec()).unwrap();
        assert!(text.starts_with("ERROR\n\n"));
        assert!(text.contains("Supported protocol versions are 1.0,1.1,1.2"));
        assert!(text.ends_with('\0'));
    }

    #[test]
    fn test_handle_connect_closed_connection() {
        let (frame, rx) = connect_frame(&["accept-version:1.2"]);
        drop(rx);
        // Nothing to deliver to; must not panic
        handle_connect(&frame);
    }
}

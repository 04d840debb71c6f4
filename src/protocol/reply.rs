//! Reply Routing
//!
//! Handlers never touch sockets. Every frame carries a [`ConnectionHandle`]
//! for the connection it arrived on, and replies are pushed through that
//! handle onto the connection's outbound channel. The connection task owns
//! the socket and writes whatever shows up on the channel, in order.

use bytes::{Bytes, BytesMut};
use std::fmt;
use tokio::sync::mpsc;

/// The NUL octet that terminates every STOMP frame on the wire.
pub const FRAME_END: &str = "\0";

/// Opaque identifier of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Errors that can occur while sending a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    /// The connection task has gone away
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}

/// Cloneable handle used to route replies to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl ConnectionHandle {
    /// Wraps the sending side of a connection's outbound channel.
    pub fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { id, outbound }
    }

    /// Creates a handle together with the receiver its replies arrive on.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns true once the connection task has stopped reading replies.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Writes `segments` to the connection, in order, as one message.
pub fn send_msg<S: AsRef<str>>(conn: &ConnectionHandle, segments: &[S]) -> Result<(), ReplyError> {
    let len = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut buf = BytesMut::with_capacity(len);
    for segment in segments {
        buf.extend_from_slice(segment.as_ref().as_bytes());
    }

    conn.outbound
        .send(buf.freeze())
        .map_err(|_| ReplyError::ConnectionClosed(conn.id))
}

/// Sends an `ERROR` frame with no headers and `body` as its body.
pub fn send_error(conn: &ConnectionHandle, body: &str) -> Result<(), ReplyError> {
    send_msg(conn, &["ERROR\n", "\n", body, FRAME_END])
}

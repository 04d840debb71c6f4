//! Connection Handler Module
//!
//! This module handles individual client connections to Kazusa.
//! Each client gets its own task that reads the socket, cuts the byte
//! stream into chunks for the frame assembler, and writes back any replies
//! the command handlers queue for it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned, outbound channel created
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────┐
//!    │      Main Loop                           │
//!    │                                          │
//!    │  ┌────────────────────┐  ┌────────────┐  │
//!    │  │ Read bytes         │  │ Reply from │  │
//!    │  │ Cut chunks         │  │ a handler  │  │
//!    │  │ Feed the assembler │  │ Write it   │  │
//!    │  └────────────────────┘  └────────────┘  │
//!    │         (whichever is ready first)       │
//!    └──────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error
//!        │
//!        ▼
//! 5. Half-built frame in the slot is dropped, task ends
//! ```
//!
//! ## Chunking
//!
//! The assembler never joins lines across chunks, so this task only hands it
//! whole lines. Bytes up to a NUL are fed as one chunk followed by the empty
//! end-of-frame chunk; otherwise everything up to the last `\n` is fed and
//! the unterminated tail waits in the buffer for the next read.

use crate::protocol::{
    AssembleError, ConnectionHandle, ConnectionId, FrameAssembler, FrameSlot, FrameStatus,
    Progress,
};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Maximum number of unterminated bytes buffered for one connection (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// The octet that ends a STOMP frame.
const NUL: u8 = 0;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total frames completed and queued
    pub frames_completed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_completed(&self) {
        self.frames_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// Read half of the TCP stream
    reader: OwnedReadHalf,

    /// Buffered write half of the TCP stream
    writer: BufWriter<OwnedWriteHalf>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Assembler shared by all connections
    assembler: FrameAssembler,

    /// The frame this connection is currently building
    slot: FrameSlot,

    /// Handle stamped on every frame from this connection
    handle: ConnectionHandle,

    /// Replies queued by command handlers
    outbound: mpsc::UnboundedReceiver<Bytes>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `id` - Identifier for this connection
    /// * `assembler` - The frame assembler feeding the broker
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        id: ConnectionId,
        assembler: FrameAssembler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        let (reader, writer) = stream.into_split();
        let (handle, outbound) = ConnectionHandle::channel(id);

        Self {
            reader,
            writer: BufWriter::new(writer),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            assembler,
            slot: None,
            handle,
            outbound,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads frames and writes replies until the client disconnects or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let id = self.handle.id();
        info!(client = %self.addr, connection = %id, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        if let Some(frame) = self.slot.take() {
            trace!(
                client = %self.addr,
                command = %frame.command(),
                status = %frame.status(),
                "Discarding incomplete frame"
            );
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-feed / reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.feed_buffered()?;

            // Ensure we have some capacity
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            tokio::select! {
                read = self.reader.read_buf(&mut self.buffer) => {
                    self.on_read(read?)?;
                }
                Some(reply) = self.outbound.recv() => {
                    self.send_reply(reply).await?;
                }
            }
        }
    }

    /// Hands every complete chunk in the buffer to the assembler.
    fn feed_buffered(&mut self) -> Result<(), ConnectionError> {
        while let Some(chunk) = next_chunk(&mut self.buffer) {
            match chunk {
                Chunk::Lines(lines) => {
                    self.assembler.feed(&self.handle, &lines, &mut self.slot)?;
                }
                Chunk::EndOfFrame(tail) => {
                    if !tail.is_empty() {
                        self.assembler.feed(&self.handle, &tail, &mut self.slot)?;
                    }
                    if self.assembler.feed(&self.handle, &[], &mut self.slot)? == Progress::Completed {
                        self.stats.frame_completed();
                    }
                }
            }
        }
        Ok(())
    }

    /// Accounts for a finished read.
    fn on_read(&mut self, n: usize) -> Result<(), ConnectionError> {
        if n == 0 {
            // Connection closed by client
            let mid_frame = self
                .slot
                .as_ref()
                .is_some_and(|frame| frame.status() != FrameStatus::Born);
            if self.buffer.is_empty() && !mid_frame {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial frame left behind
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        let unterminated = !self.buffer.iter().any(|&b| b == b'\n' || b == NUL);
        if self.buffer.len() >= MAX_BUFFER_SIZE && unterminated {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        Ok(())
    }

    /// Writes a reply to the client.
    async fn send_reply(&mut self, reply: Bytes) -> Result<(), ConnectionError> {
        self.writer.write_all(&reply).await?;
        self.writer.flush().await?;
        self.stats.bytes_written(reply.len());
        trace!(
            client = %self.addr,
            bytes = reply.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// A piece of buffered input ready for the assembler.
#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    /// One or more whole lines, terminator included
    Lines(BytesMut),
    /// Bytes before a NUL (possibly empty), then the end of the frame
    EndOfFrame(BytesMut),
}

/// Takes the next complete chunk off the front of `buf`.
fn next_chunk(buf: &mut BytesMut) -> Option<Chunk> {
    if let Some(nul) = buf.iter().position(|&b| b == NUL) {
        let tail = buf.split_to(nul);
        buf.advance(1);
        return Some(Chunk::EndOfFrame(tail));
    }

    let last_eol = buf.iter().rposition(|&b| b == b'\n')?;
    Some(Chunk::Lines(buf.split_to(last_eol + 1)))
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A frame line could not be stored
    #[error("Frame assembly error: {0}")]
    AssembleError(#[from] AssembleError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    assembler: FrameAssembler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, id, assembler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

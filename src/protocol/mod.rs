//! STOMP Framing Layer
//!
//! This module turns line-oriented socket input into STOMP frames and carries
//! replies back to the connection a frame came from.
//!
//! ## Overview
//!
//! A STOMP frame is a command line, zero or more header lines, an empty
//! separator line, zero or more body lines and a NUL terminator. Lines are
//! separated by `\n`; no escaping happens at this layer.
//!
//! ## Modules
//!
//! - `frame`: The `Frame` type, its assembly phases and line storage
//! - `assembler`: Chunk-driven state machine that builds frames
//! - `reply`: Connection handles and the reply helpers
//!
//! ## Example
//!
//! ```
//! use kazusa::bucket::FrameBucket;
//! use kazusa::protocol::{ConnectionHandle, ConnectionId, FrameAssembler};
//! use std::sync::Arc;
//!
//! let bucket = Arc::new(FrameBucket::new());
//! let assembler = FrameAssembler::new(Arc::clone(&bucket));
//! let (conn, _replies) = ConnectionHandle::channel(ConnectionId::new(1));
//!
//! let mut slot = None;
//! assembler.feed(&conn, b"CONNECT\nhost:localhost\n\n", &mut slot).unwrap();
//! assembler.feed(&conn, b"", &mut slot).unwrap();
//!
//! let frame = bucket.dequeue().unwrap();
//! assert_eq!(frame.name(), b"CONNECT");
//! ```

pub mod assembler;
pub mod frame;
pub mod reply;

// Re-export commonly used types for convenience
pub use assembler::{AssembleError, FrameAssembler, FrameSlot, Progress};
pub use frame::{
    Frame, FrameLimits, FrameStatus, LineBuffer, MAX_LINES, MAX_LINE_LEN, MAX_NAME_LEN,
};
pub use reply::{send_error, send_msg, ConnectionHandle, ConnectionId, ReplyError};

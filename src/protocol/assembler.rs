//! Streaming STOMP Frame Assembler
//!
//! The assembler turns the chunks a connection reads off its socket into
//! complete [`Frame`]s. It keeps no state of its own: the frame under
//! construction lives in a per-connection slot that the connection task
//! passes in on every call, so one assembler can serve every connection
//! without locking.
//!
//! ## State Machine
//!
//! ```text
//!            non-empty line           empty line
//!   Born ───────────────────> ReadingHeaders ───────────> ReadingBody
//!    │ (sets name)               │ (header lines)           │ (body lines)
//!    │                           │                          │
//!    └───────────────────────────┴──────────────────────────┘
//!                                │ zero-length chunk
//!                                ▼
//!                        Queued (moved into the bucket)
//! ```
//!
//! ## Chunk Rules
//!
//! 1. A zero-length chunk is the end-of-frame marker. It is the only thing
//!    that moves a frame into the bucket.
//! 2. Any other chunk is split on `\n`; a trailing terminator does not start
//!    an extra empty line. A trailing `\r` is stripped from the command and
//!    header lines only; body lines are stored as received.
//! 3. Each chunk is handled on its own. Lines are never joined across chunks,
//!    so the caller must hand over line-aligned chunks.
//! 4. Lines longer than the configured limits are truncated, never rejected.
//!    Lines past the per-frame line count limit are an error.

use crate::bucket::FrameBucket;
use crate::protocol::frame::{Frame, FrameLimits, FrameStatus};
use crate::protocol::reply::ConnectionHandle;
use std::collections::TryReserveError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Line terminator of the STOMP framing.
pub const EOL: u8 = b'\n';

/// Errors that can occur while feeding a chunk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// Storage for a line could not be reserved
    #[error("failed to allocate frame line: {0}")]
    Allocation(#[from] TryReserveError),

    /// The headers or the body already hold the maximum number of lines
    #[error("frame exceeds {limit} lines")]
    TooManyLines { limit: usize },
}

/// What a call to [`FrameAssembler::feed`] did with the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The frame is still being assembled in the slot
    Partial,
    /// The frame was completed and moved into the bucket
    Completed,
}

/// Per-connection storage for the frame currently being assembled.
pub type FrameSlot = Option<Frame>;

/// Builds frames from chunks and hands finished frames to the bucket.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    bucket: Arc<FrameBucket>,
    limits: FrameLimits,
}

impl FrameAssembler {
    /// Creates an assembler with the default size limits.
    pub fn new(bucket: Arc<FrameBucket>) -> Self {
        Self::with_limits(bucket, FrameLimits::default())
    }

    pub fn with_limits(bucket: Arc<FrameBucket>, limits: FrameLimits) -> Self {
        Self { bucket, limits }
    }

    /// Feeds one chunk read from `conn`.
    ///
    /// `slot` must be the same slot on every call for one connection; the
    /// caller drops whatever is left in it when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::Allocation`] if a line could not be stored,
    /// or [`AssembleError::TooManyLines`] once the line limit is hit. The rest of the chunk is skipped and the lines stored before the
    /// failure stay in the frame.
    pub fn feed(
        &self,
        conn: &ConnectionHandle,
        chunk: &[u8],
        slot: &mut FrameSlot,
    ) -> Result<Progress, AssembleError> {
        let limits = self.limits;
        let mut frame = match slot.take() {
            Some(frame) => frame,
            None => Frame::with_limits(conn.clone(), limits),
        };

        if chunk.is_empty() {
            frame.advance(FrameStatus::Queued);
            trace!(
                connection = %conn.id(),
                command = %frame.command(),
                headers = frame.headers().len(),
                body = frame.body().len(),
                "Frame complete"
            );
            self.bucket.enqueue(frame);
            return Ok(Progress::Completed);
        }

        let frame = slot.insert(frame);
        for line in lines(chunk) {
            if let Err(e) = accept_line(frame, line) {
                warn!(connection = %conn.id(), error = %e, "Dropping rest of chunk");
                return Err(e);
            }
        }

        Ok(Progress::Partial)
    }
}

/// Routes one line according to the frame's current phase.
///
/// An empty line while the frame is still `Born` is skipped rather than
/// starting the body. Such lines are heart-beats or the EOL that may follow
/// a NUL, and treating them as the header/body separator would turn the
/// next command line into body text.
fn accept_line(frame: &mut Frame, line: &[u8]) -> Result<(), AssembleError> {
    let status = frame.status();
    let line = match status {
        FrameStatus::Born | FrameStatus::ReadingHeaders => strip_cr(line),
        FrameStatus::ReadingBody | FrameStatus::Queued => line,
    };

    match status {
        FrameStatus::Born if line.is_empty() => Ok(()),
        FrameStatus::Born => {
            frame.set_name(line);
            Ok(())
        }
        FrameStatus::ReadingHeaders if line.is_empty() => {
            frame.advance(FrameStatus::ReadingBody);
            Ok(())
        }
        FrameStatus::ReadingHeaders => frame.push_header(line),
        FrameStatus::ReadingBody => frame.push_body(line),
        FrameStatus::Queued => Ok(()),
    }
}

/// Splits a chunk into lines.
///
/// `b"a\nb\n"` yields `a`, `b`; `b"\n"` yields one empty line; `b"a"` yields
/// `a`.
fn lines(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = chunk.strip_suffix(&[EOL]).unwrap_or(chunk);
    body.split(|&b| b == EOL)
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

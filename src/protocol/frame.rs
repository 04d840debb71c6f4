//! STOMP Frame Data Model
//!
//! A [`Frame`] is one protocol message in the making. It starts out empty in
//! the `Born` phase, collects a command name, header lines and body lines as
//! the assembler feeds it, and is finally marked `Queued` when it is handed to
//! the frame bucket.
//!
//! ## Wire Layout
//!
//! ```text
//! CONNECT\n                 <- command name
//! accept-version:1.2\n      <- header lines
//! host:localhost\n
//! \n                        <- header/body separator
//! hello\n                   <- body lines
//! ^@                        <- end of frame (NUL)
//! ```
//!
//! ## Ownership
//!
//! Frames are deliberately not `Clone`. A frame lives in exactly one place at
//! a time: the per-connection slot while it is assembled, the bucket while it
//! is queued, and the manager while it is dispatched. Moving the value is the
//! only way to hand it on, and dropping it releases every stored line once.

use crate::protocol::assembler::AssembleError;
use crate::protocol::reply::ConnectionHandle;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::TryReserveError;
use std::fmt;

/// Maximum length of a frame's command name, in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length of a single header or body line, in bytes.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum number of lines kept in one frame's headers or body.
pub const MAX_LINES: usize = 4096;

/// Assembly phase of a frame.
///
/// Phases are ordered; a frame only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameStatus {
    /// Freshly allocated, waiting for the command line.
    Born,
    /// Command seen, collecting header lines.
    ReadingHeaders,
    /// Separator seen, collecting body lines.
    ReadingBody,
    /// Complete and placed in the frame bucket.
    Queued,
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameStatus::Born => "born",
            FrameStatus::ReadingHeaders => "reading-headers",
            FrameStatus::ReadingBody => "reading-body",
            FrameStatus::Queued => "queued",
        };
        f.write_str(s)
    }
}

/// An append-only list of bounded text lines.
///
/// Each line is copied in and truncated to the buffer's line capacity. The
/// number of lines is capped as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<Bytes>,
    max_line_len: usize,
    max_lines: usize,
}

impl LineBuffer {
    /// Creates an empty buffer holding at most `max_lines` lines of at most
    /// `max_line_len` bytes each.
    pub fn new(max_line_len: usize, max_lines: usize) -> Self {
        Self {
            lines: Vec::new(),
            max_line_len,
            max_lines,
        }
    }

    /// Appends a copy of `line`, truncated to the line capacity.
    ///
    /// Both the list slot and the line copy are allocated fallibly. On any
    /// error nothing is appended and the lines stored so far are left
    /// untouched.
    pub fn push(&mut self, line: &[u8]) -> Result<(), AssembleError> {
        if self.lines.len() >= self.max_lines {
            return Err(AssembleError::TooManyLines {
                limit: self.max_lines,
            });
        }
        self.lines.try_reserve(1)?;
        let stored = copy_line(truncate(line, self.max_line_len))?;
        self.lines.push(stored);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the line at `index`.
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.lines.get(index)
    }

    /// Iterates over the stored lines in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> {
        self.lines.iter()
    }
}

impl<'a> IntoIterator for &'a LineBuffer {
    type Item = &'a Bytes;
    type IntoIter = std::slice::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

/// Size limits applied while a frame is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Command names longer than this are truncated
    pub max_name_len: usize,
    /// Header and body lines longer than this are truncated
    pub max_line_len: usize,
    /// Lines allowed in the headers, and separately in the body
    pub max_lines: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_name_len: MAX_NAME_LEN,
            max_line_len: MAX_LINE_LEN,
            max_lines: MAX_LINES,
        }
    }
}

/// A STOMP frame, complete or under construction.
pub struct Frame {
    name: Bytes,
    status: FrameStatus,
    headers: LineBuffer,
    body: LineBuffer,
    connection: ConnectionHandle,
    max_name_len: usize,
}

impl Frame {
    /// Creates an empty `Born` frame bound to `connection`.
    pub fn new(connection: ConnectionHandle) -> Self {
        Self::with_limits(connection, FrameLimits::default())
    }

    /// Creates an empty `Born` frame with custom size limits.
    pub fn with_limits(connection: ConnectionHandle, limits: FrameLimits) -> Self {
        Self {
            name: Bytes::new(),
            status: FrameStatus::Born,
            headers: LineBuffer::new(limits.max_line_len, limits.max_lines),
            body: LineBuffer::new(limits.max_line_len, limits.max_lines),
            connection,
            max_name_len: limits.max_name_len,
        }
    }

    /// The raw command name.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The command name as text, with invalid UTF-8 replaced.
    pub fn command(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub fn headers(&self) -> &LineBuffer {
        &self.headers
    }

    pub fn body(&self) -> &LineBuffer {
        &self.body
    }

    /// The connection this frame arrived on; replies go here.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Stores the command name and moves on to reading headers.
    pub(crate) fn set_name(&mut self, name: &[u8]) {
        self.name = Bytes::copy_from_slice(truncate(name, self.max_name_len));
        self.advance(FrameStatus::ReadingHeaders);
    }

    pub(crate) fn push_header(&mut self, line: &[u8]) -> Result<(), AssembleError> {
        self.headers.push(line)
    }

    pub(crate) fn push_body(&mut self, line: &[u8]) -> Result<(), AssembleError> {
        self.body.push(line)
    }

    /// Moves the frame to a later phase.
    pub(crate) fn advance(&mut self, next: FrameStatus) {
        debug_assert!(
            next >= self.status,
            "frame status cannot go back from {} to {}",
            self.status,
            next
        );
        self.status = next;
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.command())
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .field("body", &self.body.len())
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// Copies a line into its own allocation without aborting on exhaustion.
fn copy_line(data: &[u8]) -> Result<Bytes, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(data.len())?;
    buf.extend_from_slice(data);
    Ok(Bytes::from(buf))
}

#[inline]
fn truncate(data: &[u8], max: usize) -> &[u8] {
    &data[..data.len().min(max)]
}

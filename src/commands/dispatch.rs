//! Prefix Dispatch Tables
//!
//! Frames are routed by command name through an ordered list of
//! `(prefix, handler)` entries. The first entry whose prefix starts the
//! frame's name wins, so `CONNECTX` is handled as `CONNECT`. Entries without
//! a handler are commands the broker recognizes but does not implement yet;
//! frames for them, and frames matching nothing, are dropped without a reply.
//!
//! Header lines go through the same kind of table one level down: a command
//! handler lists sub-handlers keyed by header prefix (`host:`,
//! `accept-version:`) and [`iterate_headers`] feeds every header line to the
//! first sub-handler that matches it.

use crate::commands::connect;
use crate::protocol::{Frame, LineBuffer};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// A top-level frame handler. Side effects only; the frame is borrowed for
/// the duration of the call.
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// A header sub-handler: receives the header line with the matched prefix
/// removed, plus the command's parsing context.
pub type HeaderFn<C> = fn(&str, &mut C) -> Result<(), HeaderError>;

/// Errors reported by header sub-handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// None of the versions offered by the client is supported
    #[error("unsupported protocol version(s): {0}")]
    UnsupportedVersion(String),

    /// A header value could not be understood
    #[error("invalid {header} header: {reason}")]
    InvalidValue { header: &'static str, reason: String },
}

/// How a frame was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran for the entry with this prefix
    Handled(&'static str),
    /// The command is known but has no handler yet
    Unimplemented(&'static str),
    /// No entry matched
    Unknown,
}

struct Entry {
    prefix: &'static str,
    handler: Option<FrameHandler>,
}

/// Ordered `(prefix, handler)` table with first-match-wins lookup.
#[derive(Default)]
pub struct DispatchTable {
    entries: Vec<Entry>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.prefix, e.handler.is_some())))
            .finish()
    }
}

impl DispatchTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The broker's command table.
    ///
    /// Only `CONNECT` (and its 1.2 spelling `STOMP`) is handled so far; the
    /// remaining client commands are listed so they are recognized and
    /// dropped quietly.
    pub fn stomp() -> Self {
        let mut table = Self::new();
        table
            .unimplemented("SEND")
            .unimplemented("SUBSCRIBE")
            .register("CONNECT", connect::handle_connect)
            .unimplemented("DISCONNECT")
            .unimplemented("UNSUBSCRIBE")
            .unimplemented("BEGIN")
            .unimplemented("COMMIT")
            .unimplemented("ABORT")
            .unimplemented("ACK")
            .unimplemented("NACK")
            .register("STOMP", connect::handle_connect);
        table
    }

    /// Appends an entry that runs `handler` for names starting with `prefix`.
    pub fn register<F>(&mut self, prefix: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            prefix,
            handler: Some(Arc::new(handler)),
        });
        self
    }

    /// Appends a recognized command that has no handler.
    pub fn unimplemented(&mut self, prefix: &'static str) -> &mut Self {
        self.entries.push(Entry {
            prefix,
            handler: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Routes `frame` to the first matching entry.
    pub fn dispatch(&self, frame: &Frame) -> Dispatch {
        let entry = self
            .entries
            .iter()
            .find(|e| frame.name().starts_with(e.prefix.as_bytes()));

        match entry {
            Some(Entry {
                prefix,
                handler: Some(handler),
            }) => {
                trace!(connection = %frame.connection().id(), command = *prefix, "Dispatching frame");
                handler(frame);
                Dispatch::Handled(*prefix)
            }
            Some(Entry {
                prefix,
                handler: None,
            }) => {
                debug!(
                    connection = %frame.connection().id(),
                    command = *prefix,
                    "Command not implemented, frame dropped"
                );
                Dispatch::Unimplemented(*prefix)
            }
            None => {
                debug!(
                    connection = %frame.connection().id(),
                    command = %frame.command(),
                    "Unknown command, frame dropped"
                );
                Dispatch::Unknown
            }
        }
    }
}

/// A header sub-handler entry.
pub struct HeaderHandler<C> {
    pub prefix: &'static str,
    pub handler: HeaderFn<C>,
}

impl<C> HeaderHandler<C> {
    pub const fn new(prefix: &'static str, handler: HeaderFn<C>) -> Self {
        Self { prefix, handler }
    }
}

/// Runs every header line through the first matching sub-handler.
///
/// Lines that match no sub-handler are skipped. The first sub-handler error
/// stops the iteration and is returned.
pub fn iterate_headers<C>(
    headers: &LineBuffer,
    handlers: &[HeaderHandler<C>],
    ctx: &mut C,
) -> Result<(), HeaderError> {
    for line in headers {
        let Some(h) = handlers
            .iter()
            .find(|h| line.starts_with(h.prefix.as_bytes()))
        else {
            continue;
        };

        let value: Cow<'_, str> = String::from_utf8_lossy(&line[h.prefix.len()..]);
        (h.handler)(&value, ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionHandle, ConnectionId, FrameAssembler};
    use crate::bucket::FrameBucket;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_frame(chunk: &[u8]) -> Frame {
        let bucket = Arc::new(FrameBucket::new());
        let assembler = FrameAssembler::new(Arc::clone(&bucket));
        let (conn, _rx) = ConnectionHandle::channel(ConnectionId::new(1));
        let mut slot = None;
        assembler.feed(&conn, chunk, &mut slot).unwrap();
        assembler.feed(&conn, b"", &mut slot).unwrap();
        bucket.dequeue().unwrap()
    }

    fn counting_table() -> (DispatchTable, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let sends = Arc::new(AtomicUsize::new(0));
        let mut table = DispatchTable::new();
        let c = Arc::clone(&connects);
        let s = Arc::clone(&sends);
        table
            .register("SEND", move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .register("CONNECT", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unimplemented("ACK");
        (table, connects, sends)
    }

    #[test]
    fn test_dispatch_exact_match() {
        let (table, connects, sends) = counting_table();
        let frame = make_frame(b"CONNECT\n\n");

        assert_eq!(table.dispatch(&frame), Dispatch::Handled("CONNECT"));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_prefix_match() {
        let (table, connects, _) = counting_table();
        let frame = make_frame(b"CONNECTX\n\n");

        assert_eq!(table.dispatch(&frame), Dispatch::Handled("CONNECT"));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unknown() {
        let (table, connects, sends) = counting_table();
        let frame = make_frame(b"UNKNOWNCMD\n\n");

        assert_eq!(table.dispatch(&frame), Dispatch::Unknown);
        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_unimplemented() {
        let (table, _, _) = counting_table();
        let frame = make_frame(b"ACK\nid:1\n\n");
        assert_eq!(table.dispatch(&frame), Dispatch::Unimplemented("ACK"));
    }

    #[test]
    fn test_first_match_wins() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let mut table = DispatchTable::new();
        table
            .register("SUB", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unimplemented("SUBSCRIBE");

        let frame = make_frame(b"SUBSCRIBE\n\n");
        assert_eq!(table.dispatch(&frame), Dispatch::Handled("SUB"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stomp_table() {
        let table = DispatchTable::stomp();
        assert_eq!(table.len(), 11);

        let frame = make_frame(b"SEND\ndestination:/queue/a\n\nhi");
        assert_eq!(table.dispatch(&frame), Dispatch::Unimplemented("SEND"));

        let frame = make_frame(b"NACK\n\n");
        assert_eq!(table.dispatch(&frame), Dispatch::Unimplemented("NACK"));

        let frame = make_frame(b"CONNECT\n\n");
        assert_eq!(table.dispatch(&frame), Dispatch::Handled("CONNECT"));
    }

    #[derive(Default)]
    struct Seen {
        hosts: Vec<String>,
        logins: Vec<String>,
    }

    fn on_host(value: &str, ctx: &mut Seen) -> Result<(), HeaderError> {
        ctx.hosts.push(value.to_string());
        Ok(())
    }

    fn on_login(value: &str, ctx: &mut Seen) -> Result<(), HeaderError> {
        if value.is_empty() {
            return Err(HeaderError::InvalidValue {
                header: "login",
                reason: "empty".to_string(),
            });
        }
        ctx.logins.push(value.to_string());
        Ok(())
    }

    const SUB_HANDLERS: &[HeaderHandler<Seen>] = &[
        HeaderHandler::new("host:", on_host),
        HeaderHandler::new("login:", on_login),
    ];

    #[test]
    fn test_iterate_headers() {
        let frame = make_frame(b"CONNECT\nhost:a\nreceipt:1\nlogin:guest\nhost:b\n\n");
        let mut seen = Seen::default();

        iterate_headers(frame.headers(), SUB_HANDLERS, &mut seen).unwrap();
        assert_eq!(seen.hosts, vec!["a", "b"]);
        assert_eq!(seen.logins, vec!["guest"]);
    }

    #[test]
    fn test_iterate_headers_short_circuits() {
        let frame = make_frame(b"CONNECT\nlogin:\nhost:never\n\n");
        let mut seen = Seen::default();

        let err = iterate_headers(frame.headers(), SUB_HANDLERS, &mut seen).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidValue { header: "login", .. }));
        assert!(seen.hosts.is_empty());
    }
}

//! Command Dispatch Module
//!
//! This module routes completed frames to their command handlers.
//!
//! ## Architecture
//!
//! ```text
//! Frame (from the bucket)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  DispatchTable  │  first prefix match wins
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ command handler │  e.g. CONNECT
//! │                 │
//! │ iterate_headers │  per-header sub-handlers
//! └────────┬────────┘
//!          │
//!          ▼
//!   reply on the frame's connection
//! ```
//!
//! ## Commands
//!
//! - `CONNECT`, `STOMP`: version negotiation, replies `CONNECTED` or `ERROR`
//! - `SEND`, `SUBSCRIBE`, `UNSUBSCRIBE`, `DISCONNECT`, `BEGIN`, `COMMIT`,
//!   `ABORT`, `ACK`, `NACK`: recognized, not implemented yet

pub mod connect;
pub mod dispatch;

pub use connect::{handle_connect, parse_connect, ConnectRequest};
pub use dispatch::{
    iterate_headers, Dispatch, DispatchTable, FrameHandler, HeaderError, HeaderFn, HeaderHandler,
};

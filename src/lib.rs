//! # Kazusa - STOMP Frame Assembly and Dispatch Core
//!
//! Kazusa is the core of a STOMP message broker written in Rust. It rebuilds
//! protocol frames from socket reads that arrive in arbitrary pieces, queues
//! finished frames for a single background worker, and routes each one to
//! the handler for its command.
//!
//! ## Features
//!
//! - **Streaming Assembly**: A per-connection state machine builds frames
//!   line by line, truncating oversized lines instead of failing
//! - **Ordered Processing**: Frames are processed one at a time, in the order
//!   they were completed
//! - **Prefix Dispatch**: Commands are routed through an ordered prefix table,
//!   with sub-tables for header parsing
//! - **Async I/O**: Built on Tokio for handling many concurrent connections
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Kazusa                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│   Frame     │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Assembler  │                  │
//! │  └─────────────┘    └──────▲──────┘    └──────┬──────┘                  │
//! │                            │                  │ enqueue                 │
//! │                            │ reply            ▼                         │
//! │                            │           ┌─────────────┐                  │
//! │                            │           │ FrameBucket │                  │
//! │                            │           └──────┬──────┘                  │
//! │                            │                  │ dequeue                 │
//! │                            │                  ▼                         │
//! │                     ┌──────┴──────┐    ┌─────────────┐                  │
//! │                     │  Command    │<───│  Manager    │                  │
//! │                     │  Handlers   │    │ (Tokio task)│                  │
//! │                     └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use kazusa::broker::{Broker, BrokerConfig};
//! use kazusa::connection::{handle_connection, ConnectionStats};
//! use kazusa::protocol::ConnectionId;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Start the frame manager
//!     let broker = Broker::init(BrokerConfig::default()).unwrap();
//!
//!     // Create connection statistics
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     // Start listening for connections
//!     let listener = TcpListener::bind("127.0.0.1:61613").await.unwrap();
//!
//!     for id in 1.. {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let assembler = broker.assembler();
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, ConnectionId::new(id), assembler, stats));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Frame model, frame assembler and reply helpers
//! - [`bucket`]: Frame queue and the background manager that drains it
//! - [`commands`]: Dispatch tables and command handlers
//! - [`connection`]: Client connection management
//! - [`broker`]: Startup and shutdown of the core
//!
//! ## Design Highlights
//!
//! ### Single Owner Frames
//!
//! A frame is never shared. It is moved from the connection's slot into the
//! bucket, and from the bucket to the manager, which drops it after dispatch.
//!
//! ### Wake on Enqueue
//!
//! The manager sleeps on the bucket's `Notify` and wakes as soon as a frame
//! is queued, with a fixed idle interval as a fallback poll.

pub mod broker;
pub mod bucket;
pub mod commands;
pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use broker::{Broker, BrokerConfig, BrokerError};
pub use bucket::{FrameBucket, Manager, ManagerConfig};
pub use commands::{Dispatch, DispatchTable};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{AssembleError, ConnectionHandle, ConnectionId, Frame, FrameAssembler};

/// The default port Kazusa listens on (the registered STOMP port)
pub const DEFAULT_PORT: u16 = 61613;

/// The default host Kazusa binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Kazusa
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

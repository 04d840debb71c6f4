//! Connection Handler Module
//!
//! This module manages individual client connections to Kazusa.
//! Each client connection is handled by its own async task, allowing
//! the server to handle thousands of concurrent clients efficiently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Cut chunks  │───>│ Feed frame  │     │
//! │  └─────────────┘    └─────────────┘    │ assembler   │     │
//! │                                        └─────────────┘     │
//! │  ┌─────────────┐    ┌─────────────┐                        │
//! │  │ Write reply │<───│ Outbound    │<─── command handlers   │
//! │  └─────────────┘    │ channel     │                        │
//! │                     └─────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Buffer Management**: BytesMut buffer holds partial lines between reads
//! - **Pipelining**: Several frames may arrive in a single TCP packet
//! - **Reply Routing**: Handlers reply through the connection's channel
//! - **Statistics**: Tracks connection and frame metrics
//!
//! ## Example
//!
//! ```ignore
//! use kazusa::broker::{Broker, BrokerConfig};
//! use kazusa::connection::{handle_connection, ConnectionStats};
//! use kazusa::protocol::ConnectionId;
//! use std::sync::Arc;
//!
//! let broker = Broker::init(BrokerConfig::default())?;
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! let id = ConnectionId::new(1);
//! tokio::spawn(handle_connection(stream, addr, id, broker.assembler(), stats));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};

//! Broker Lifecycle
//!
//! [`Broker::init`] wires the core together: it builds the frame bucket and
//! the dispatch table and starts the manager on the current Tokio runtime.
//! [`Broker::shutdown`] stops the manager and frees whatever is still
//! queued. Shutdown also runs when the broker is dropped, so the bucket is
//! always drained exactly once the broker goes away.
//!
//! Connection tasks must stop producing before shutdown for the drain to be
//! final; frames enqueued afterwards are dropped with the bucket itself.

use crate::bucket::{FrameBucket, Manager, ManagerConfig, ManagerStats};
use crate::commands::DispatchTable;
use crate::protocol::{FrameAssembler, FrameLimits};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tracing::info;

/// Errors that can occur while starting the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `init` was called outside a Tokio runtime
    #[error("no Tokio runtime to run the frame manager on: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// Configuration for the broker core.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Frame manager settings
    pub manager: ManagerConfig,
    /// Size limits for assembled frames
    pub limits: FrameLimits,
}

/// The running frame-processing core.
#[derive(Debug)]
pub struct Broker {
    bucket: Arc<FrameBucket>,
    manager: Manager,
    limits: FrameLimits,
    shut_down: AtomicBool,
}

impl Broker {
    /// Starts the broker with the standard STOMP command table.
    pub fn init(config: BrokerConfig) -> Result<Self, BrokerError> {
        Self::with_table(DispatchTable::stomp(), config)
    }

    /// Starts the broker with a custom dispatch table.
    pub fn with_table(table: DispatchTable, config: BrokerConfig) -> Result<Self, BrokerError> {
        let runtime = Handle::try_current()?;
        let bucket = Arc::new(FrameBucket::new());
        let manager = Manager::start(&runtime, Arc::clone(&bucket), Arc::new(table), config.manager);

        Ok(Self {
            bucket,
            manager,
            limits: config.limits,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns an assembler feeding this broker's bucket.
    pub fn assembler(&self) -> FrameAssembler {
        FrameAssembler::with_limits(Arc::clone(&self.bucket), self.limits)
    }

    pub fn bucket(&self) -> &Arc<FrameBucket> {
        &self.bucket
    }

    pub fn manager_stats(&self) -> &Arc<ManagerStats> {
        self.manager.stats()
    }

    /// Stops the manager and frees every frame still in the bucket.
    ///
    /// Returns how many queued frames were freed. Calling it again only
    /// drains frames queued since the last call.
    pub fn shutdown(&self) -> usize {
        self.manager.stop();
        let freed = self.bucket.drain_and_free();

        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!(freed = freed, "Broker shut down");
        }
        freed
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionHandle, ConnectionId};
    use bytes::Bytes;
    use std::time::Duration;

    #[test]
    fn test_init_requires_runtime() {
        assert!(matches!(
            Broker::init(BrokerConfig::default()),
            Err(BrokerError::NoRuntime(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_round_trip() {
        let broker = Broker::init(BrokerConfig::default()).unwrap();
        let assembler = broker.assembler();
        let (conn, mut replies) = ConnectionHandle::channel(ConnectionId::new(1));
        let mut slot = None;

        assembler
            .feed(&conn, b"CONNECT\naccept-version:1.2\nhost:localhost\n\n", &mut slot)
            .unwrap();
        assembler.feed(&conn, b"", &mut slot).unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .unwrap()
            .unwrap();
        let expected = format!("CONNECTED\nversion:1.2\nserver:kazusa/{}\n\n\0", crate::VERSION);
        assert_eq!(reply, Bytes::from(expected));
    }

    #[tokio::test]
    async fn test_shutdown_drains_bucket() {
        let broker = Broker::init(BrokerConfig::default()).unwrap();
        broker.manager.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let assembler = broker.assembler();
        let (conn, _rx) = ConnectionHandle::channel(ConnectionId::new(1));
        for _ in 0..3 {
            let mut slot = None;
            assembler.feed(&conn, b"SEND\n\nbody", &mut slot).unwrap();
            assembler.feed(&conn, b"", &mut slot).unwrap();
        }
        assert_eq!(broker.bucket().len(), 3);

        assert_eq!(broker.shutdown(), 3);
        assert!(broker.bucket().dequeue().is_none());
        assert_eq!(broker.shutdown(), 0);
    }

    #[tokio::test]
    async fn test_independent_brokers() {
        let first = Broker::init(BrokerConfig::default()).unwrap();
        let second = Broker::init(BrokerConfig::default()).unwrap();
        assert!(!Arc::ptr_eq(first.bucket(), second.bucket()));
    }
}

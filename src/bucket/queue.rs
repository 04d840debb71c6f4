//! Thread-Safe Frame Bucket
//!
//! The bucket is the handoff point between the connection tasks that
//! assemble frames and the single manager task that processes them.
//!
//! ```text
//!  conn 1 ──┐
//!  conn 2 ──┼──> enqueue ──> [ F1 | F2 | F3 ] ──> dequeue ──> Manager
//!  conn N ──┘                 Mutex<VecDeque>
//! ```
//!
//! Every operation takes the same lock, and the lock is held only for the
//! O(1) push or pop, so producers never wait on frame processing. Frames come
//! out in the order they were completed.
//!
//! Besides the lock the bucket carries a [`Notify`] so the consumer can sleep
//! until something arrives instead of polling on a fixed timer.

use crate::protocol::{Frame, FrameStatus};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// A mutex-guarded FIFO of completed frames.
///
/// Shared as `Arc<FrameBucket>` between every producer and the consumer.
#[derive(Default)]
pub struct FrameBucket {
    frames: Mutex<VecDeque<Frame>>,
    notify: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    freed: AtomicU64,
}

impl std::fmt::Debug for FrameBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBucket")
            .field("len", &self.len())
            .field("enqueued", &self.enqueued.load(Ordering::Relaxed))
            .field("dequeued", &self.dequeued.load(Ordering::Relaxed))
            .field("freed", &self.freed.load(Ordering::Relaxed))
            .finish()
    }
}

impl FrameBucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the queue. A poisoned lock is taken over: the queue holds no
    /// invariant a panicking holder could have broken halfway.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a completed frame to the tail and wakes the consumer.
    pub fn enqueue(&self, frame: Frame) {
        debug_assert_eq!(frame.status(), FrameStatus::Queued);
        let connection = frame.connection().id();

        let depth = {
            let mut frames = self.lock();
            frames.push_back(frame);
            frames.len()
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        trace!(connection = %connection, depth = depth, "Frame queued");
    }

    /// Removes and returns the oldest frame, if any.
    pub fn dequeue(&self) -> Option<Frame> {
        let frame = self.lock().pop_front();
        if frame.is_some() {
            self.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Drops every queued frame and returns how many were freed.
    ///
    /// Used at shutdown. Safe to call on an empty bucket and safe to call
    /// while producers are still enqueueing.
    pub fn drain_and_free(&self) -> usize {
        let drained: Vec<Frame> = self.lock().drain(..).collect();
        let count = drained.len();
        drop(drained);

        if count > 0 {
            self.freed.fetch_add(count as u64, Ordering::Relaxed);
            debug!(frames = count, "Drained frame bucket");
        }
        count
    }

    /// Waits until a frame has been enqueued.
    ///
    /// A wake-up issued while nobody is waiting is kept, so an enqueue that
    /// races with the consumer going to sleep is never lost. The frame itself
    /// still has to be taken with [`dequeue`](Self::dequeue).
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a snapshot of the bucket counters.
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            queued: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters of a [`FrameBucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    /// Frames currently waiting
    pub queued: usize,
    /// Frames ever enqueued
    pub enqueued: u64,
    /// Frames handed to a consumer
    pub dequeued: u64,
    /// Frames dropped by a drain
    pub freed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionHandle, ConnectionId, FrameAssembler};
    use std::sync::Arc;
    use std::thread;
    use tokio_test::{assert_pending, assert_ready, task};

    fn queued_frame(id: u64, name: &str) -> Frame {
        let (conn, _rx) = ConnectionHandle::channel(ConnectionId::new(id));
        let mut frame = Frame::new(conn);
        frame.set_name(name.as_bytes());
        frame.advance(FrameStatus::Queued);
        frame
    }

    #[test]
    fn test_dequeue_empty() {
        let bucket = FrameBucket::new();
        assert!(bucket.dequeue().is_none());
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let bucket = FrameBucket::new();
        bucket.enqueue(queued_frame(1, "F1"));
        bucket.enqueue(queued_frame(2, "F2"));
        assert_eq!(bucket.len(), 2);

        assert_eq!(bucket.dequeue().unwrap().name(), b"F1");
        assert_eq!(bucket.dequeue().unwrap().name(), b"F2");
        assert!(bucket.dequeue().is_none());
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let bucket = FrameBucket::new();
        assert_eq!(bucket.drain_and_free(), 0);
        assert_eq!(bucket.drain_and_free(), 0);
        assert!(bucket.dequeue().is_none());
    }

    #[test]
    fn test_drain_frees_everything() {
        let bucket = FrameBucket::new();
        for i in 0..5 {
            bucket.enqueue(queued_frame(i, "SEND"));
        }

        assert_eq!(bucket.drain_and_free(), 5);
        assert!(bucket.dequeue().is_none());

        let stats = bucket.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.enqueued, 5);
        assert_eq!(stats.dequeued, 0);
        assert_eq!(stats.freed, 5);
    }

    #[test]
    fn test_concurrent_producers() {
        const PRODUCERS: u64 = 16;
        let bucket = Arc::new(FrameBucket::new());
        let assembler = FrameAssembler::new(Arc::clone(&bucket));

        thread::scope(|s| {
            for id in 0..PRODUCERS {
                let assembler = &assembler;
                s.spawn(move || {
                    let (conn, _rx) = ConnectionHandle::channel(ConnectionId::new(id));
                    let mut slot = None;
                    let name = format!("SEND{}", id);
                    assembler.feed(&conn, name.as_bytes(), &mut slot).unwrap();
                    assembler.feed(&conn, b"\n", &mut slot).unwrap();
                    assembler.feed(&conn, format!("body-{}", id).as_bytes(), &mut slot).unwrap();
                    assembler.feed(&conn, b"", &mut slot).unwrap();
                    assert!(slot.is_none());
                });
            }
        });

        let mut seen = Vec::new();
        while let Some(frame) = bucket.dequeue() {
            let id = frame.connection().id().as_u64();
            assert_eq!(frame.command(), format!("SEND{}", id));
            assert_eq!(frame.body().len(), 1);
            assert_eq!(frame.body().get(0).unwrap().as_ref(), format!("body-{}", id).as_bytes());
            seen.push(id);
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..PRODUCERS).collect::<Vec<_>>());
    }

    #[test]
    fn test_wait_woken_by_enqueue() {
        let bucket = FrameBucket::new();
        let mut wait = task::spawn(bucket.wait());
        assert_pending!(wait.poll());

        bucket.enqueue(queued_frame(1, "SEND"));
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_wakeup_before_wait_is_kept() {
        let bucket = FrameBucket::new();
        bucket.enqueue(queued_frame(1, "SEND"));

        let mut wait = task::spawn(bucket.wait());
        assert_ready!(wait.poll());
    }
}

//! Frame Bucket Module
//!
//! This module holds the queue that completed frames wait in and the
//! background manager that drains it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FrameBucket                           │
//! │              Mutex<VecDeque<Frame>> + Notify                │
//! │   ┌────┐ ┌────┐ ┌────┐                                      │
//! │   │ F1 │ │ F2 │ │ F3 │ ...  oldest first                    │
//! │   └────┘ └────┘ └────┘                                      │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲                                   │
//!        │ enqueue (any connection)          │ dequeue (one consumer)
//!        │                                   ▼
//!  FrameAssembler                 ┌───────────────────────────┐
//!                                 │         Manager           │
//!                                 │  (Background Tokio Task)  │
//!                                 └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use kazusa::bucket::FrameBucket;
//!
//! let bucket = FrameBucket::new();
//! assert!(bucket.dequeue().is_none());
//! assert_eq!(bucket.drain_and_free(), 0);
//! ```

pub mod manager;
pub mod queue;

// Re-export commonly used types
pub use manager::{Manager, ManagerConfig, ManagerStats};
pub use queue::{BucketStats, FrameBucket};

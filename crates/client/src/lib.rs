//! Device-resident sync client for the workout session runtime.
//!
//! Mutations are applied optimistically to a local cache, then delivered
//! through a durable offline queue that guarantees at-least-once delivery
//! with bounded backoff while the device is disconnected.

#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod queue;
pub mod store;
pub mod sync;

pub use cache::SessionCache;
pub use error::{StoreError, SyncError, TransportError};
pub use queue::{QueueItem, QueueStatus};
pub use store::{FileStore, MemoryStore, QueueStore};
pub use sync::{FlushReport, SyncClient, Transport};

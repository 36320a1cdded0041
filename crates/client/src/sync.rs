//! The sync client: optimistic apply, durable enqueue, flush with backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use workout_core::model::{EventId, ProgressUpdate, SessionView};
use workout_core::time::Clock;
use workout_core::Pointer;

use crate::cache::SessionCache;
use crate::error::{SyncError, TransportError};
use crate::queue::{QueueItem, QueueStatus};
use crate::store::QueueStore;

/// Delivery channel to the progress mutation service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one mutation; on success the server returns its current
    /// session tree.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Rejected` for terminal server refusals and
    /// `TransportError::Unreachable` for network-level failures.
    async fn send(&self, update: &ProgressUpdate) -> Result<SessionView, TransportError>;

    /// Fetch the caller's active session, if any.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` as for `send`.
    async fn fetch_active(&self) -> Result<Option<SessionView>, TransportError>;
}

/// What one flush pass accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Items acknowledged and removed.
    pub delivered: usize,
    /// Items deferred to backoff after a network failure.
    pub deferred: usize,
    /// Items rejected by the server and retired from rotation.
    pub rejected: usize,
}

/// Device-resident sync client.
///
/// Every mutation is applied to the local cache first, persisted to the
/// durable queue second, and delivered third; the queue is the sole proof of
/// unacknowledged local mutations and survives process restarts.
pub struct SyncClient {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    clock: Clock,
    items: Mutex<Vec<QueueItem>>,
    cache: Mutex<SessionCache>,
    flushing: AtomicBool,
}

impl SyncClient {
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>, transport: Arc<dyn Transport>, clock: Clock) -> Self {
        Self {
            store,
            transport,
            clock,
            items: Mutex::new(Vec::new()),
            cache: Mutex::new(SessionCache::new()),
            flushing: AtomicBool::new(false),
        }
    }

    /// Loads the persisted queue, resetting any item that was in flight when
    /// the process died back to pending so it is delivered again.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the store cannot be read or rewritten.
    pub async fn recover(&self) -> Result<(), SyncError> {
        let mut loaded = self.store.load().await?;
        let mut reset = 0;
        for item in &mut loaded {
            if item.status == QueueStatus::Sending {
                item.status = QueueStatus::Pending;
                reset += 1;
            }
        }
        if reset > 0 {
            self.store.save(&loaded).await?;
            info!(count = reset, "recovered in-flight items to pending");
        }
        debug!(count = loaded.len(), "loaded queue");
        *self.items.lock().await = loaded;
        Ok(())
    }

    /// Queues a mutation for delivery, applying it to the local cache first.
    ///
    /// A fresh event id is assigned when the payload carries none, so every
    /// queued item is individually idempotent on the server.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the queue cannot be persisted.
    pub async fn enqueue(&self, mut update: ProgressUpdate) -> Result<EventId, SyncError> {
        let event_id = update.event_id.unwrap_or_else(EventId::generate);
        update.event_id = Some(event_id);
        let now = self.clock.now();

        self.cache.lock().await.apply(&update, now);

        let mut items = self.items.lock().await;
        items.push(QueueItem::new(event_id, update, now));
        self.store.save(&items).await?;
        debug!(event_id = %event_id, pending = items.len(), "enqueued mutation");
        Ok(event_id)
    }

    /// Attempts delivery of every retryable item, oldest first.
    ///
    /// Returns `None` if a flush is already in progress; the loop is never
    /// entered twice concurrently. `force` retries failed items before their
    /// backoff deadline, used when connectivity just came back.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the queue cannot be persisted. Delivery
    /// failures are not errors; they are recorded on the items.
    pub async fn flush(&self, force: bool) -> Result<Option<FlushReport>, SyncError> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("flush already in progress");
            return Ok(None);
        }
        let result = self.flush_inner(force).await;
        self.flushing.store(false, Ordering::Release);
        result.map(Some)
    }

    /// Signals that the device regained connectivity; forces an immediate
    /// flush regardless of backoff deadlines.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the queue cannot be persisted.
    pub async fn notify_online(&self) -> Result<Option<FlushReport>, SyncError> {
        info!("connectivity restored, flushing queue");
        self.flush(true).await
    }

    /// Replaces the local cache with server truth.
    ///
    /// Transport failures leave the cache as it was; the next flush or
    /// refresh will try again.
    pub async fn refresh(&self) {
        match self.transport.fetch_active().await {
            Ok(view) => self.cache.lock().await.replace(view),
            Err(e) => debug!(error = %e, "refresh failed, keeping cached copy"),
        }
    }

    /// Current cached session view, if any.
    pub async fn cached_view(&self) -> Option<SessionView> {
        self.cache.lock().await.view().cloned()
    }

    /// Advances the cached pointer one step and queues the pointer save.
    ///
    /// Returns the new position, or `None` once the snapshot is exhausted
    /// (nothing is queued in that case).
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the queue cannot be persisted.
    pub async fn advance_pointer(&self) -> Result<Option<Pointer>, SyncError> {
        let advanced = self.cache.lock().await.advance();
        let Some(pointer) = advanced else {
            return Ok(None);
        };
        self.enqueue(ProgressUpdate {
            event_id: None,
            current_pointer: Some(pointer),
            set_update: None,
        })
        .await?;
        Ok(Some(pointer))
    }

    /// Number of items still awaiting acknowledgment, terminal ones included.
    pub async fn queue_len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Items rejected by the server, kept so the failure can be surfaced.
    pub async fn terminal_items(&self) -> Vec<QueueItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|i| i.is_terminal())
            .cloned()
            .collect()
    }

    async fn flush_inner(&self, force: bool) -> Result<FlushReport, SyncError> {
        let mut report = FlushReport::default();
        let mut items = self.items.lock().await;
        let mut index = 0;

        while index < items.len() {
            let now = self.clock.now();
            if !items[index].should_retry_now(now, force) {
                index += 1;
                continue;
            }

            items[index].mark_sending(now);
            self.store.save(&items).await?;

            let outcome = self.transport.send(&items[index].payload).await;
            let now = self.clock.now();
            match outcome {
                Ok(view) => {
                    let item = items.remove(index);
                    self.store.save(&items).await?;
                    self.cache.lock().await.replace(Some(view));
                    report.delivered += 1;
                    debug!(event_id = %item.event_id, "mutation acknowledged");
                }
                Err(TransportError::Rejected(message)) => {
                    items[index].record_rejection(&message, now);
                    self.store.save(&items).await?;
                    report.rejected += 1;
                    warn!(
                        event_id = %items[index].event_id,
                        error = %message,
                        "mutation rejected, retiring item"
                    );
                    // The optimistic copy may have drifted from what the
                    // server accepted; fall back to server truth.
                    drop(items);
                    self.refresh().await;
                    items = self.items.lock().await;
                    index += 1;
                }
                Err(TransportError::Unreachable(message)) => {
                    items[index].record_failure(&message, now);
                    self.store.save(&items).await?;
                    report.deferred += 1;
                    warn!(
                        event_id = %items[index].event_id,
                        attempts = items[index].attempts,
                        error = %message,
                        "delivery failed, deferring to backoff"
                    );
                    // Transport is down; later items would only fail too.
                    break;
                }
            }
        }

        if report.delivered > 0 {
            info!(delivered = report.delivered, remaining = items.len(), "flush complete");
        }
        Ok(report)
    }
}

//! Durable queue items and the retry/backoff schedule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use workout_core::model::{EventId, ProgressUpdate};

/// Fixed escalating backoff steps, in milliseconds.
///
/// Indexed by `attempts - 1` and clamped to the last step, so retries settle
/// at 30s rather than growing without bound.
pub const BACKOFF_STEPS_MS: [i64; 5] = [1_000, 2_000, 5_000, 10_000, 30_000];

/// How long an item must wait after its latest failed attempt.
#[must_use]
pub fn backoff_delay(attempts: u32) -> Duration {
    let index = (attempts.saturating_sub(1) as usize).min(BACKOFF_STEPS_MS.len() - 1);
    Duration::milliseconds(BACKOFF_STEPS_MS[index])
}

/// Lifecycle of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Created and persisted, waiting for delivery.
    Pending,
    /// Handed to the transport; a crash here is recovered back to pending.
    Sending,
    /// Confirmed by the server. Acked items are removed, never kept.
    Acked,
    /// Delivery failed. Retryable if `next_retry_at` is set, terminal
    /// otherwise.
    Failed,
}

/// One unacknowledged mutation, durable across process restarts.
///
/// The payload is self-describing (it carries its own pointer and set
/// target), so items may be retried out of arrival order without harm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub payload: ProgressUpdate,
}

impl QueueItem {
    #[must_use]
    pub fn new(event_id: EventId, payload: ProgressUpdate, now: DateTime<Utc>) -> Self {
        Self {
            event_id,
            created_at: now,
            updated_at: now,
            status: QueueStatus::Pending,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            payload,
        }
    }

    /// Whether this item should be attempted at `now`.
    ///
    /// Pending items always qualify. Failed items qualify once their backoff
    /// deadline passes, or immediately when `force` is set (the device just
    /// came back online). Terminal failures never qualify.
    #[must_use]
    pub fn should_retry_now(&self, now: DateTime<Utc>, force: bool) -> bool {
        match self.status {
            QueueStatus::Pending => true,
            QueueStatus::Sending | QueueStatus::Acked => false,
            QueueStatus::Failed => match self.next_retry_at {
                Some(at) => force || now >= at,
                None => false,
            },
        }
    }

    /// A failed item with no retry deadline was rejected by the server and
    /// will never be retried.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status == QueueStatus::Failed && self.next_retry_at.is_none()
    }

    pub fn mark_sending(&mut self, now: DateTime<Utc>) {
        self.status = QueueStatus::Sending;
        self.updated_at = now;
    }

    /// Records a network-level failure and schedules the next attempt.
    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = QueueStatus::Failed;
        self.last_error = Some(truncate_error(error));
        self.next_retry_at = Some(now + backoff_delay(self.attempts));
        self.updated_at = now;
    }

    /// Records a server rejection. The item leaves the retry rotation for
    /// good and is kept only so the failure can be surfaced.
    pub fn record_rejection(&mut self, error: &str, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = QueueStatus::Failed;
        self.last_error = Some(truncate_error(error));
        self.next_retry_at = None;
        self.updated_at = now;
    }
}

const MAX_ERROR_LEN: usize = 120;

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use workout_core::time::fixed_now;

    fn item() -> QueueItem {
        QueueItem::new(
            EventId::generate(),
            ProgressUpdate {
                event_id: None,
                current_pointer: Some(workout_core::Pointer::origin()),
                set_update: None,
            },
            fixed_now(),
        )
    }

    #[test]
    fn backoff_steps_escalate_and_clamp() {
        // First recorded failure waits the first step.
        assert_eq!(backoff_delay(0), Duration::milliseconds(1_000));
        assert_eq!(backoff_delay(1), Duration::milliseconds(1_000));
        assert_eq!(backoff_delay(2), Duration::milliseconds(2_000));
        assert_eq!(backoff_delay(3), Duration::milliseconds(5_000));
        assert_eq!(backoff_delay(4), Duration::milliseconds(10_000));
        assert_eq!(backoff_delay(5), Duration::milliseconds(30_000));
        // Clamped once the table is exhausted.
        assert_eq!(backoff_delay(9), Duration::milliseconds(30_000));
    }

    #[test]
    fn pending_items_always_retry() {
        let item = item();
        assert!(item.should_retry_now(fixed_now(), false));
    }

    #[test]
    fn failed_item_waits_for_its_deadline_unless_forced() {
        let now = fixed_now();
        let mut item = item();
        item.record_failure("connection reset", now);

        assert_eq!(item.attempts, 1);
        assert_eq!(item.next_retry_at, Some(now + Duration::milliseconds(1_000)));
        assert!(!item.should_retry_now(now, false));
        assert!(item.should_retry_now(now + Duration::milliseconds(1_000), false));
        assert!(item.should_retry_now(now, true));
    }

    #[test]
    fn repeated_failures_walk_the_schedule() {
        let now = fixed_now();
        let mut item = item();
        for _ in 0..3 {
            item.record_failure("timeout", now);
        }
        assert_eq!(item.attempts, 3);
        assert_eq!(item.next_retry_at, Some(now + Duration::milliseconds(5_000)));
    }

    #[test]
    fn rejection_is_terminal_even_when_forced() {
        let now = fixed_now();
        let mut item = item();
        item.record_rejection("forbidden", now);

        assert!(item.is_terminal());
        assert!(!item.should_retry_now(now, false));
        assert!(!item.should_retry_now(now, true));
    }

    #[test]
    fn error_messages_are_truncated() {
        let now = fixed_now();
        let mut item = item();
        item.record_failure(&"x".repeat(500), now);
        assert_eq!(item.last_error.as_ref().unwrap().len(), 120);
    }

    #[test]
    fn sending_items_are_not_picked_up_again() {
        let now = fixed_now();
        let mut item = item();
        item.mark_sending(now);
        assert!(!item.should_retry_now(now, true));
    }
}

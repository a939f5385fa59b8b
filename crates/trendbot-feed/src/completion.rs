//! Batch completion tracking.
//!
//! State machine: `Waiting` -> `Satisfied` when the last expected request
//! completes, or `Waiting` -> `TimedOut` when the waiter's deadline passes
//! first. Both transitions happen under one lock, so exactly one of them
//! wins and the waiter is released exactly once per batch.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trendbot_core::RequestId;

/// Tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Waiting,
    Satisfied,
    TimedOut,
}

/// Result of [`CompletionTracker::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Every expected request completed.
    Satisfied,
    /// Deadline passed; `missing` never completed (sorted).
    TimedOut { missing: Vec<RequestId> },
}

/// Result of recording one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionUpdate {
    /// Recorded; `remaining` requests still outstanding.
    Progress { remaining: usize },
    /// Recorded, and it was the last one: the waiter was released.
    Released,
    /// Already completed earlier; ignored.
    Duplicate,
    /// Not part of this batch; ignored.
    Unexpected,
    /// Recorded after the batch timed out; nobody is waiting for it.
    Late,
}

#[derive(Debug)]
struct TrackerInner {
    pending: HashSet<RequestId>,
    completed: HashSet<RequestId>,
    state: TrackerState,
    releases: u32,
}

/// Counts completions against the expected request set.
#[derive(Debug)]
pub struct CompletionTracker {
    inner: Mutex<TrackerInner>,
    tx: watch::Sender<TrackerState>,
}

impl CompletionTracker {
    /// Create a tracker expecting one completion per request id.
    ///
    /// An empty batch is satisfied immediately.
    pub fn new(expected: impl IntoIterator<Item = RequestId>) -> Self {
        let pending: HashSet<RequestId> = expected.into_iter().collect();
        let (state, releases) = if pending.is_empty() {
            (TrackerState::Satisfied, 1)
        } else {
            (TrackerState::Waiting, 0)
        };
        let (tx, _rx) = watch::channel(state);

        Self {
            inner: Mutex::new(TrackerInner {
                pending,
                completed: HashSet::new(),
                state,
                releases,
            }),
            tx,
        }
    }

    /// Record the completion of `req_id`.
    pub fn mark_complete(&self, req_id: RequestId) -> CompletionUpdate {
        let mut inner = self.inner.lock();

        if inner.completed.contains(&req_id) {
            debug!(%req_id, "Duplicate completion ignored");
            return CompletionUpdate::Duplicate;
        }
        if !inner.pending.remove(&req_id) {
            warn!(%req_id, "Completion for a request outside this batch");
            return CompletionUpdate::Unexpected;
        }
        inner.completed.insert(req_id);

        match inner.state {
            TrackerState::Waiting if inner.pending.is_empty() => {
                inner.state = TrackerState::Satisfied;
                inner.releases += 1;
                self.tx.send_replace(TrackerState::Satisfied);
                info!(completed = inner.completed.len(), "All requests completed");
                CompletionUpdate::Released
            }
            TrackerState::Waiting => CompletionUpdate::Progress {
                remaining: inner.pending.len(),
            },
            TrackerState::TimedOut | TrackerState::Satisfied => {
                debug!(%req_id, "Completion arrived after the batch timed out");
                CompletionUpdate::Late
            }
        }
    }

    /// Block until every request completed or `timeout` elapses.
    ///
    /// On timeout the tracker moves to `TimedOut`; later completions are
    /// still accepted but report [`CompletionUpdate::Late`].
    pub async fn wait(&self, timeout: Duration) -> CompletionOutcome {
        let mut rx = self.tx.subscribe();
        let released = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s != TrackerState::Waiting)).await,
            Ok(Ok(_))
        );

        let mut inner = self.inner.lock();
        match inner.state {
            TrackerState::Satisfied => CompletionOutcome::Satisfied,
            TrackerState::Waiting => {
                if released {
                    warn!("Completion channel closed while waiting");
                }
                inner.state = TrackerState::TimedOut;
                self.tx.send_replace(TrackerState::TimedOut);
                CompletionOutcome::TimedOut {
                    missing: sorted(&inner.pending),
                }
            }
            TrackerState::TimedOut => CompletionOutcome::TimedOut {
                missing: sorted(&inner.pending),
            },
        }
    }

    pub fn state(&self) -> TrackerState {
        self.inner.lock().state
    }

    /// Requests not yet completed (sorted).
    pub fn missing(&self) -> Vec<RequestId> {
        sorted(&self.inner.lock().pending)
    }

    /// Whether `req_id` completed (in time or late).
    pub fn is_complete(&self, req_id: RequestId) -> bool {
        self.inner.lock().completed.contains(&req_id)
    }

    /// How many times the waiter has been released as satisfied (0 or 1).
    pub fn release_count(&self) -> u32 {
        self.inner.lock().releases
    }
}

fn sorted(ids: &HashSet<RequestId>) -> Vec<RequestId> {
    let mut ids: Vec<RequestId> = ids.iter().copied().collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<RequestId> {
        range.map(RequestId::new).collect()
    }

    #[test]
    fn test_releases_on_last_completion() {
        let tracker = CompletionTracker::new(ids(1..=3));

        assert_eq!(
            tracker.mark_complete(RequestId::new(2)),
            CompletionUpdate::Progress { remaining: 2 }
        );
        assert_eq!(
            tracker.mark_complete(RequestId::new(1)),
            CompletionUpdate::Progress { remaining: 1 }
        );
        assert_eq!(tracker.mark_complete(RequestId::new(3)), CompletionUpdate::Released);
        assert_eq!(tracker.state(), TrackerState::Satisfied);
        assert_eq!(tracker.release_count(), 1);
    }

    #[test]
    fn test_duplicate_completion_never_double_releases() {
        let tracker = CompletionTracker::new(ids(1..=2));

        tracker.mark_complete(RequestId::new(1));
        // Duplicate must not count toward the remaining request
        assert_eq!(tracker.mark_complete(RequestId::new(1)), CompletionUpdate::Duplicate);
        assert_eq!(tracker.state(), TrackerState::Waiting);

        assert_eq!(tracker.mark_complete(RequestId::new(2)), CompletionUpdate::Released);
        assert_eq!(tracker.mark_complete(RequestId::new(2)), CompletionUpdate::Duplicate);
        assert_eq!(tracker.mark_complete(RequestId::new(1)), CompletionUpdate::Duplicate);
        assert_eq!(tracker.release_count(), 1);
    }

    #[test]
    fn test_unexpected_request_ignored() {
        let tracker = CompletionTracker::new(ids(1..=1));
        assert_eq!(tracker.mark_complete(RequestId::new(99)), CompletionUpdate::Unexpected);
        assert_eq!(tracker.missing(), ids(1..=1));
    }

    #[test]
    fn test_empty_batch_satisfied_immediately() {
        let tracker = CompletionTracker::new(Vec::new());
        assert_eq!(tracker.state(), TrackerState::Satisfied);
        let outcome = tokio_test::block_on(tracker.wait(Duration::from_millis(1)));
        assert_eq!(outcome, CompletionOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_satisfied() {
        let tracker = CompletionTracker::new(ids(1..=1));
        tracker.mark_complete(RequestId::new(1));

        let started = std::time::Instant::now();
        let outcome = tracker.wait(Duration::from_secs(5)).await;
        assert_eq!(outcome, CompletionOutcome::Satisfied);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_completions_before_wait_release_promptly() {
        let tracker = CompletionTracker::new(ids(1..=2));
        assert_eq!(
            tracker.mark_complete(RequestId::new(1)),
            CompletionUpdate::Progress { remaining: 1 }
        );
        assert_eq!(tracker.mark_complete(RequestId::new(2)), CompletionUpdate::Released);

        let started = std::time::Instant::now();
        let outcome = tracker.wait(Duration::from_secs(3)).await;
        assert_eq!(outcome, CompletionOutcome::Satisfied);
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "wait took {:?}",
            started.elapsed()
        );
        assert_eq!(tracker.release_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_released_by_concurrent_completions() {
        let tracker = Arc::new(CompletionTracker::new(ids(1..=3)));

        let feeder = Arc::clone(&tracker);
        tokio::spawn(async move {
            for n in 1..=3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                feeder.mark_complete(RequestId::new(n));
                // Repeated end marker
                feeder.mark_complete(RequestId::new(n));
            }
        });

        let outcome = tracker.wait(Duration::from_secs(5)).await;
        assert_eq!(outcome, CompletionOutcome::Satisfied);
        assert_eq!(tracker.release_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_missing() {
        let tracker = CompletionTracker::new(ids(1..=3));
        tracker.mark_complete(RequestId::new(1));
        tracker.mark_complete(RequestId::new(3));

        let outcome = tracker.wait(Duration::from_millis(30)).await;
        assert_eq!(
            outcome,
            CompletionOutcome::TimedOut {
                missing: vec![RequestId::new(2)]
            }
        );
        assert_eq!(tracker.state(), TrackerState::TimedOut);
        assert_eq!(tracker.release_count(), 0);
    }

    #[tokio::test]
    async fn test_late_completion_accepted_after_timeout() {
        let tracker = CompletionTracker::new(ids(1..=2));
        tracker.mark_complete(RequestId::new(1));
        let _ = tracker.wait(Duration::from_millis(10)).await;

        assert_eq!(tracker.mark_complete(RequestId::new(2)), CompletionUpdate::Late);
        assert!(tracker.is_complete(RequestId::new(2)));
        // Still timed out; a late completion never flips the batch to satisfied
        assert_eq!(tracker.state(), TrackerState::TimedOut);
        assert_eq!(tracker.release_count(), 0);
    }
}

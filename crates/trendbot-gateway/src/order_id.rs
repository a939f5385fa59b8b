//! Session-scoped order-id counter.
//!
//! Seeded by the broker's `nextValidId` callback and advanced once per
//! reservation. Ids are dispensed exactly once: reservation is a CAS loop,
//! so concurrent callers never observe the same value, and re-seeding can
//! only move the counter forward.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};
use trendbot_core::OrderId;

use crate::error::{GatewayError, GatewayResult};

/// Monotonic order-id dispenser.
///
/// # Guarantees
/// - Reserved ids are pairwise distinct and strictly increasing
/// - The counter never decreases, even if the broker re-announces a lower id
/// - Thread-safe for concurrent access
#[derive(Debug)]
pub struct OrderIdCounter {
    /// Next id to hand out.
    next: AtomicU64,
    /// Set once the broker has announced `nextValidId`.
    seeded: AtomicBool,
    /// Broadcasts seeding to waiters.
    seeded_tx: watch::Sender<bool>,
}

impl OrderIdCounter {
    /// Creates an unseeded counter. Reservations fail until [`seed`](Self::seed).
    #[must_use]
    pub fn new() -> Self {
        let (seeded_tx, _rx) = watch::channel(false);
        Self {
            next: AtomicU64::new(0),
            seeded: AtomicBool::new(false),
            seeded_tx,
        }
    }

    /// Applies a broker-announced `nextValidId`.
    ///
    /// Fast-forwards the counter to `id` if it is ahead; a lower id is
    /// ignored. Returns the id the next reservation will receive.
    pub fn seed(&self, id: OrderId) -> OrderId {
        let target = id.value();
        loop {
            let current = self.next.load(Ordering::Acquire);
            let seeded = self.seeded.load(Ordering::Acquire);
            if seeded && current >= target {
                if current > target {
                    warn!(
                        announced = target,
                        current, "Broker announced an order id below the counter; keeping counter"
                    );
                }
                break;
            }

            match self
                .next
                .compare_exchange_weak(current, target, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(_) => continue,
            }
        }

        self.seeded.store(true, Ordering::Release);
        self.seeded_tx.send_replace(true);

        let next = OrderId::new(self.next.load(Ordering::Acquire));
        debug!(next_order_id = %next, "Order id counter seeded");
        next
    }

    /// Reserves the next order id.
    ///
    /// # Errors
    /// Returns `GatewayError::NotSeeded` before the broker has announced an id.
    pub fn reserve(&self) -> GatewayResult<OrderId> {
        if !self.seeded.load(Ordering::Acquire) {
            return Err(GatewayError::NotSeeded);
        }

        loop {
            let current = self.next.load(Ordering::Acquire);
            match self.next.compare_exchange_weak(
                current,
                current.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(OrderId::new(current)),
                Err(_) => continue,
            }
        }
    }

    /// Returns the id the next reservation would receive, if seeded.
    #[must_use]
    pub fn peek(&self) -> Option<OrderId> {
        self.is_seeded()
            .then(|| OrderId::new(self.next.load(Ordering::Acquire)))
    }

    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.seeded.load(Ordering::Acquire)
    }

    /// Waits until the counter is seeded or `timeout` elapses.
    ///
    /// Returns the next id on success, `None` on timeout.
    pub async fn wait_seeded(&self, timeout: Duration) -> Option<OrderId> {
        if let Some(id) = self.peek() {
            return Some(id);
        }

        let mut rx = self.seeded_tx.subscribe();
        let seeded = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|seeded| *seeded)).await,
            Ok(Ok(_))
        );
        if seeded {
            self.peek()
        } else {
            None
        }
    }
}

impl Default for OrderIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

//! Backpressure toward the storefront relay: a bounded queue of due apps and a
//! policy deciding how long to wait between consecutive checks.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::models::TrackedApp;

/// Waits between two consecutive checks of a batch.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps a fixed delay.
#[derive(Debug, Clone)]
pub struct FixedDelayPacer {
    delay: Duration,
}

impl FixedDelayPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

#[async_trait]
impl Pacer for FixedDelayPacer {
    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Counts pauses without sleeping.
#[derive(Debug, Default)]
pub struct CountingPacer {
    pauses: AtomicUsize,
}

impl CountingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

/// Due apps for one tick, drained by a single worker. Apps beyond `capacity` are
/// deferred; they stay due and are picked up by a later tick.
#[derive(Debug)]
pub struct CheckQueue {
    items: VecDeque<TrackedApp>,
    deferred: usize,
    taken: usize,
}

impl CheckQueue {
    pub fn new(mut due: Vec<TrackedApp>, capacity: usize) -> Self {
        let deferred = due.len().saturating_sub(capacity);
        due.truncate(capacity);
        Self {
            items: due.into(),
            deferred,
            taken: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn deferred(&self) -> usize {
        self.deferred
    }

    /// Pops the next app, pausing first unless it is the first one of the batch.
    pub async fn next_paced(&mut self, pacer: &dyn Pacer) -> Option<TrackedApp> {
        let app = self.items.pop_front()?;
        if self.taken > 0 {
            pacer.pause().await;
        }
        self.taken += 1;
        Some(app)
    }
}

//! Deferred removal of retiring keys.
//!
//! Pending removals sit in a min-heap ordered by deadline. A single worker
//! task sleeps until the earliest deadline, purges every due key and goes
//! back to sleep. Scheduling a new removal wakes the worker so it can
//! re-evaluate the earliest deadline.
//!
//! Deadlines are [`tokio::time::Instant`]s: monotonic, immune to wall-clock
//! changes during the grace window, and driven by Tokio's paused clock in
//! tests.

use crate::{key::KeyId, keystore::Keystore};
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{
    runtime::Handle,
    sync::Notify,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A removal waiting for its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoval {
    /// Key to purge
    pub id: KeyId,
    /// Earliest moment the purge may run
    pub due_at: Instant,
    seq: u64,
}

impl Ord for PendingRemoval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for PendingRemoval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending removals
#[derive(Debug, Default)]
pub struct RemovalQueue {
    heap: BinaryHeap<Reverse<PendingRemoval>>,
    next_seq: u64,
}

impl RemovalQueue {
    /// Queue `id` for removal at `due_at`
    pub fn push(&mut self, id: KeyId, due_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(PendingRemoval { id, due_at, seq }));
    }

    /// Earliest deadline
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(p)| p.due_at)
    }

    /// Pop every removal whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Vec<PendingRemoval> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|at| at <= now) {
            if let Some(Reverse(pending)) = self.heap.pop() {
                due.push(pending);
            }
        }
        due
    }

    /// Pending removals in deadline order
    #[must_use]
    pub fn pending(&self) -> Vec<PendingRemoval> {
        let mut pending: Vec<_> = self.heap.iter().map(|Reverse(p)| p.clone()).collect();
        pending.sort();
        pending
    }

    /// Drop everything, returning how many removals were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.heap.len();
        self.heap.clear();
        dropped
    }

    /// Number of pending removals
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

fn lock(queue: &Mutex<RemovalQueue>) -> MutexGuard<'_, RemovalQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the removal queue and the worker draining it.
#[derive(Debug)]
pub(crate) struct RemovalScheduler {
    queue: Arc<Mutex<RemovalQueue>>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RemovalScheduler {
    /// Spawn the worker on `runtime`
    pub(crate) fn spawn(keystore: Arc<Keystore>, runtime: &Handle) -> Self {
        let queue = Arc::new(Mutex::new(RemovalQueue::default()));
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let worker = runtime.spawn(run_worker(
            keystore,
            Arc::clone(&queue),
            Arc::clone(&wake),
            shutdown.clone(),
        ));

        Self {
            queue,
            wake,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a removal; returns `false` after shutdown
    pub(crate) fn schedule(&self, id: KeyId, due_at: Instant) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        lock(&self.queue).push(id, due_at);
        self.wake.notify_one();
        true
    }

    pub(crate) fn pending(&self) -> Vec<PendingRemoval> {
        lock(&self.queue).pending()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub(crate) async fn cancelled(&self) {
        self.shutdown.cancelled().await;
    }

    /// Cancel every pending removal and stop the worker.
    ///
    /// Returns the number of removals cancelled. Calling it again returns 0.
    pub(crate) async fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        let cancelled = lock(&self.queue).clear();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Removal worker ended abnormally");
            }
        }
        cancelled
    }
}

impl Drop for RemovalScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    keystore: Arc<Keystore>,
    queue: Arc<Mutex<RemovalQueue>>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) {
    loop {
        let next_due = lock(&queue).next_due();
        let deadline = async {
            match next_due {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = wake.notified() => continue,
            () = deadline => {
                let due = lock(&queue).pop_due(Instant::now());
                for pending in due {
                    purge(&keystore, &pending);
                }
            }
        }
    }
    debug!("Removal worker stopped");
}

fn purge(keystore: &Keystore, pending: &PendingRemoval) {
    match keystore.remove(&pending.id) {
        Ok(Some(removed)) => {
            let grace_secs = removed
                .retired_at
                .map(|at| removed.removed_at.saturating_duration_since(at).as_secs());
            info!(kid = %pending.id, grace_secs, "Removed retired signing key");
        }
        Ok(None) => debug!(kid = %pending.id, "Retired key already absent"),
        Err(e) => warn!(kid = %pending.id, error = %e, "Skipped removal of key"),
    }
}

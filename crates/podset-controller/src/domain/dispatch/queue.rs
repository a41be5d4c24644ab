//! Deduplicating work queue with delayed and rate-limited re-adds

use std::cmp::Reverse;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use priority_queue::PriorityQueue;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::backoff::Backoff;

struct QueueState<K: Hash + Eq> {
    /// Keys ready to be handed out, each at most once.
    ready: VecDeque<K>,
    /// Keys waiting to be processed (ready, or re-added while processing).
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    /// Delayed adds; the earliest deadline wins for a key.
    delayed: PriorityQueue<K, Reverse<Instant>>,
    /// Consecutive failures per key.
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K: Hash + Eq + Clone> QueueState<K> {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            delayed: PriorityQueue::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }

    /// Returns true when the key became ready.
    fn enqueue(&mut self, key: K) -> bool {
        if !self.dirty.insert(key.clone()) {
            return false;
        }
        if self.processing.contains(&key) {
            return false;
        }
        self.ready.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        while self
            .delayed
            .peek()
            .is_some_and(|(_, Reverse(deadline))| *deadline <= now)
        {
            if let Some((key, _)) = self.delayed.pop() {
                self.enqueue(key);
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.peek().map(|(_, Reverse(deadline))| *deadline)
    }
}

/// Work queue handing each key to at most one worker at a time.
///
/// Adding a key that is already waiting is a no-op. Adding a key that a worker is
/// processing marks it dirty; it becomes ready again once the worker calls
/// [`WorkQueue::done`]. After [`WorkQueue::shut_down`], [`WorkQueue::get`] returns
/// `None` and adds are ignored.
pub struct WorkQueue<K: Hash + Eq> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff: Backoff,
}

impl<K: Hash + Eq + Clone> WorkQueue<K> {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
            backoff,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `key` ready now.
    pub fn add(&self, key: K) {
        let became_ready = {
            let mut state = self.state();
            !state.shutting_down && state.enqueue(key)
        };
        if became_ready {
            self.notify.notify_waiters();
        }
    }

    /// Makes `key` ready once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            state.delayed.push_increase(key, Reverse(Instant::now() + delay));
        }
        // wake sleepers so they pick up an earlier deadline
        self.notify.notify_waiters();
    }

    /// Records a failure for `key` and re-adds it after the resulting backoff.
    ///
    /// Returns the delay that was applied.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let failures = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = self.backoff.delay(failures);
        self.add_after(key, delay);
        delay
    }

    /// Clears the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Waits for the next ready key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Releases `key` after processing; a key re-added meanwhile becomes ready again.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.ready.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Stops handing out keys and wakes every waiting worker.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.state().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently held by workers.
    pub fn in_flight(&self) -> usize {
        self.state().processing.len()
    }
}

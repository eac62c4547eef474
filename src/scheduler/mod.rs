//! Callback scheduler and result cache
//!
//! Providers register a [`Fetch`] under a [`ProviderKey`]. Registrations are deduplicated by
//! key: every template field asking for the same key gets a [`CallbackHandle`] onto one
//! shared cache cell, refreshed by one periodic fetch.
//!
//! Scheduling is driven by the display's main loop. Each call to [`Scheduler::tick`] drains a
//! min-heap of `(next_fire_tick, key)` entries and hands the due fetches to a bounded worker
//! pool. The set of keys with a fetch running lives in the scheduler state, not in the
//! registration, so at most one fetch runs for a key even across release and re-register. `tick` only
//! pushes work onto a channel, so the main loop never waits for a provider.

mod callback;
mod key;
mod pool;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use callback::{CallbackHandle, FailurePolicy, Fetch, FetchError};
pub use key::{period_ticks, ProviderKey};

use callback::{CallbackCell, EntryId, Job};
use pool::WorkerPool;

/// Scheduler options
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Length of one display tick
    pub tick_interval: Duration,
    /// Number of fetch worker threads
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            worker_threads: 4,
        }
    }
}

/// Snapshot of the scheduler's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Live registrations
    pub registrations: usize,
    /// Fetches dispatched and not yet finished
    pub in_flight: usize,
    /// Ticks processed so far
    pub tick: u64,
}

struct Entry {
    job: Arc<dyn Job>,
    refs: usize,
    period: u32,
    /// Sequence number of this entry's live heap item; older items are stale
    seq: u64,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Due {
    fire: u64,
    seq: u64,
    id: EntryId,
}

#[derive(Default)]
struct State {
    tick: u64,
    seq: u64,
    entries: HashMap<EntryId, Entry>,
    queue: BinaryHeap<Reverse<Due>>,
    /// Keys with a fetch dispatched and not yet finished. Outlives released entries.
    running: HashSet<EntryId>,
    stopped: bool,
}

impl State {
    fn schedule(&mut self, id: EntryId, fire: u64) -> u64 {
        self.seq += 1;
        let seq = self.seq;
        self.queue.push(Reverse(Due { fire, seq, id }));
        seq
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    idle: Condvar,
    pool: WorkerPool,
}

impl Shared {
    pub(crate) fn retain(&self, id: &EntryId) {
        if let Some(entry) = self.state.lock().entries.get_mut(id) {
            entry.refs += 1;
        }
    }

    pub(crate) fn release(&self, id: &EntryId) {
        let removed = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 {
                return;
            }
            state.entries.remove(id)
        };
        // the cell is dropped outside the lock
        if let Some(entry) = removed {
            entry.job.cancel();
            tracing::debug!(key = %id.key(), "registration released");
        }
    }

    fn finish(&self, id: &EntryId) {
        let mut state = self.state.lock();
        state.running.remove(id);
        if state.running.is_empty() {
            self.idle.notify_all();
        }
    }
}

/// Deduplicating periodic fetch scheduler. Shuts down on drop.
pub struct Scheduler {
    shared: Arc<Shared>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let pool = WorkerPool::new(config.worker_threads);
        tracing::debug!(
            workers = pool.size(),
            tick = ?config.tick_interval,
            "scheduler started"
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                idle: Condvar::new(),
                pool,
            }),
            tick_interval: config.tick_interval,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Period in ticks for a requested refresh interval
    pub fn period_for(&self, desired: Duration) -> u32 {
        period_ticks(desired, self.tick_interval)
    }

    /// Register interest in `key`, fetched every `period` ticks.
    ///
    /// If the key is already registered the existing cell is shared, `fetcher` is dropped,
    /// and the period becomes the smaller of the two. New registrations fire on the next
    /// tick.
    pub fn register<F: Fetch>(
        &self,
        key: ProviderKey,
        period: u32,
        fetcher: F,
    ) -> CallbackHandle<F::Output> {
        let period = period.max(1);
        let id = EntryId::of::<F::Output>(key.clone());
        let mut state = self.shared.state.lock();

        if state.stopped {
            tracing::warn!(key = %key, "scheduler is shut down; field will keep its default");
            return CallbackHandle::detached(Arc::new(CallbackCell::new(key, Box::new(fetcher))));
        }

        let now = state.tick;
        let mut lowered = false;
        let mut shared_cell = None;
        if let Some(entry) = state.entries.get_mut(&id) {
            if let Ok(cell) = Arc::clone(&entry.job)
                .as_any()
                .downcast::<CallbackCell<F::Output>>()
            {
                entry.refs += 1;
                if period < entry.period {
                    entry.period = period;
                    lowered = true;
                }
                shared_cell = Some(cell);
            }
        }

        if let Some(cell) = shared_cell {
            if lowered {
                let seq = state.schedule(id.clone(), now);
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.seq = seq;
                }
            }
            tracing::debug!(key = %key, period, "sharing existing registration");
            return CallbackHandle::new(cell, id, Arc::downgrade(&self.shared));
        }

        let cell = Arc::new(CallbackCell::new(key, Box::new(fetcher)));
        let seq = state.schedule(id.clone(), now);
        let job: Arc<dyn Job> = cell.clone();
        state.entries.insert(
            id.clone(),
            Entry {
                job,
                refs: 1,
                period,
                seq,
            },
        );
        tracing::debug!(key = %id.key(), period, "registered");
        CallbackHandle::new(cell, id, Arc::downgrade(&self.shared))
    }

    /// Advance one tick and dispatch every due fetch. Returns how many were dispatched.
    pub fn tick(&self) -> usize {
        let mut due_jobs = Vec::new();
        {
            let mut guard = self.shared.state.lock();
            if guard.stopped {
                return 0;
            }
            let now = guard.tick;
            let state = &mut *guard;

            while state
                .queue
                .peek()
                .is_some_and(|Reverse(due)| due.fire <= now)
            {
                let Some(Reverse(due)) = state.queue.pop() else {
                    break;
                };
                let Some(entry) = state.entries.get_mut(&due.id) else {
                    continue;
                };
                if entry.seq != due.seq {
                    continue;
                }

                let next = if state.running.insert(due.id.clone()) {
                    due_jobs.push((due.id.clone(), Arc::clone(&entry.job)));
                    now + u64::from(entry.period)
                } else {
                    tracing::trace!(key = %due.id.key(), "previous fetch still running");
                    now + 1
                };

                state.seq += 1;
                entry.seq = state.seq;
                state.queue.push(Reverse(Due {
                    fire: next,
                    seq: state.seq,
                    id: due.id,
                }));
            }

            state.tick += 1;
        }

        let dispatched = due_jobs.len();
        for (id, job) in due_jobs {
            let shared = Arc::clone(&self.shared);
            let task_job = Arc::clone(&job);
            let task_id = id.clone();
            let task = Box::new(move || {
                task_job.run();
                shared.finish(&task_id);
            });
            if self.shared.pool.execute(task).is_err() {
                // pool already closed; undo the in-flight bookkeeping by hand
                job.cancel();
                self.shared.finish(&id);
            }
        }
        dispatched
    }

    /// Block until no fetch is in flight or `timeout` passes. True if idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.running.is_empty() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.running.is_empty();
            }
        }
        true
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            registrations: state.entries.len(),
            in_flight: state.running.len(),
            tick: state.tick,
        }
    }

    /// Outstanding handles on `key`, over all value types. Zero if unregistered.
    pub fn ref_count(&self, key: &ProviderKey) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .filter(|(id, _)| id.key() == key)
            .map(|(_, entry)| entry.refs)
            .sum()
    }

    /// Current period of `key` in ticks, if it is registered
    pub fn period_of(&self, key: &ProviderKey) -> Option<u32> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .find(|(id, _)| id.key() == key)
            .map(|(_, entry)| entry.period)
    }

    /// Drop every registration and join the workers.
    ///
    /// A fetch already running is not interrupted, so this waits for the slowest one.
    pub fn shutdown(&self) {
        let entries = {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.queue.clear();
            std::mem::take(&mut state.entries)
        };
        for entry in entries.values() {
            entry.job.cancel();
        }
        let count = entries.len();
        drop(entries);

        self.shared.pool.shutdown();
        tracing::debug!(released = count, "scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

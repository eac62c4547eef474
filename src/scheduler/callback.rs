//! Cached registrations and the handles template nodes hold on them

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use super::key::ProviderKey;
use super::Shared;

/// Errors a fetch can report. None of them stop the scheduler.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{reason}")]
    Unavailable { reason: String },

    #[error("unexpected data: {reason}")]
    Malformed { reason: String },
}

impl FetchError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// What a registration shows after a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Keep the last committed value
    KeepLast,
    /// Replace the cached value with the sentinel
    Sentinel,
}

/// A periodic data source run by the scheduler's workers.
pub trait Fetch: Send + Sync + 'static {
    type Output: Clone + Send + 'static;

    /// Produce a fresh value. Called from a worker thread, never concurrently for one key.
    fn fetch(&self) -> Result<Self::Output, FetchError>;

    /// Value shown before the first successful fetch
    fn sentinel(&self) -> Self::Output;

    fn on_failure(&self) -> FailurePolicy {
        FailurePolicy::KeepLast
    }
}

/// Map identity of a registration. The value type is part of it so a lookup can always
/// downcast to the cell it finds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EntryId {
    ty: TypeId,
    key: ProviderKey,
}

impl EntryId {
    pub(crate) fn of<T: 'static>(key: ProviderKey) -> Self {
        Self {
            ty: TypeId::of::<T>(),
            key,
        }
    }

    pub(crate) fn key(&self) -> &ProviderKey {
        &self.key
    }
}

/// Type-erased view of a registration used by the dispatcher.
pub(crate) trait Job: Send + Sync {
    fn key(&self) -> &ProviderKey;

    /// Run one fetch and commit its result
    fn run(&self);

    fn cancel(&self);

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct CallbackCell<T> {
    key: ProviderKey,
    fetcher: Box<dyn Fetch<Output = T>>,
    result: Mutex<T>,
    cancelled: AtomicBool,
    fetches: AtomicU64,
    failures: AtomicU64,
}

impl<T: Clone + Send + 'static> CallbackCell<T> {
    pub(crate) fn new(key: ProviderKey, fetcher: Box<dyn Fetch<Output = T>>) -> Self {
        let sentinel = fetcher.sentinel();
        Self {
            key,
            fetcher,
            result: Mutex::new(sentinel),
            cancelled: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn commit(&self, value: T) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        *self.result.lock() = value;
    }

    fn fail(&self, reason: &dyn std::fmt::Display) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(key = %self.key, error = %reason, "fetch failed");
        if self.fetcher.on_failure() == FailurePolicy::Sentinel {
            self.commit(self.fetcher.sentinel());
        }
    }
}

impl<T: Clone + Send + 'static> Job for CallbackCell<T> {
    fn key(&self) -> &ProviderKey {
        &self.key
    }

    fn run(&self) {
        if !self.cancelled.load(Ordering::Acquire) {
            match panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch())) {
                Ok(Ok(value)) => {
                    self.fetches.fetch_add(1, Ordering::Relaxed);
                    self.commit(value);
                    tracing::trace!(key = %self.key, "fetch committed");
                }
                Ok(Err(e)) => self.fail(&e),
                Err(_) => self.fail(&"fetch panicked"),
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A template node's share of a registration.
///
/// Cloning retains the registration and dropping releases it; the last release stops the
/// periodic fetch and frees the cached value.
pub struct CallbackHandle<T: Clone + Send + 'static> {
    cell: Arc<CallbackCell<T>>,
    id: Option<EntryId>,
    scheduler: Weak<Shared>,
}

impl<T: Clone + Send + 'static> CallbackHandle<T> {
    pub(crate) fn new(cell: Arc<CallbackCell<T>>, id: EntryId, scheduler: Weak<Shared>) -> Self {
        Self {
            cell,
            id: Some(id),
            scheduler,
        }
    }

    /// A handle not tracked by any scheduler. It only ever shows the sentinel.
    pub(crate) fn detached(cell: Arc<CallbackCell<T>>) -> Self {
        Self {
            cell,
            id: None,
            scheduler: Weak::new(),
        }
    }

    /// Copy of the most recently committed value, or the sentinel before the first fetch
    pub fn get_result_copy(&self) -> T {
        self.cell.result.lock().clone()
    }

    pub fn key(&self) -> &ProviderKey {
        &self.cell.key
    }

    /// Number of successful fetches so far
    pub fn fetch_count(&self) -> u64 {
        self.cell.fetches.load(Ordering::Relaxed)
    }

    /// Number of failed fetches so far
    pub fn failure_count(&self) -> u64 {
        self.cell.failures.load(Ordering::Relaxed)
    }

    /// Whether two handles share one registration
    pub fn same_registration(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone + Send + 'static> Clone for CallbackHandle<T> {
    fn clone(&self) -> Self {
        if let (Some(id), Some(shared)) = (&self.id, self.scheduler.upgrade()) {
            shared.retain(id);
        }
        Self {
            cell: Arc::clone(&self.cell),
            id: self.id.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Drop for CallbackHandle<T> {
    fn drop(&mut self) {
        if let (Some(id), Some(shared)) = (&self.id, self.scheduler.upgrade()) {
            shared.release(id);
        }
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for CallbackHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("key", &self.cell.key)
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

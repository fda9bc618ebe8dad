//! Explicit observer graph
//!
//! The engine does not use automatic dependency tracking. Instead it runs
//! on three explicit pieces:
//!
//! - a crate-wide revision counter; every state change bumps it;
//! - [`Signal`], a revision-stamped settable cell;
//! - [`Scheduler`], a cooperative tick queue. Work deferred during a tick
//!   runs on the NEXT tick, never the current one.
//!
//! Recomputation is pull-based: mutations request a propagation pass, and
//! the owning loop (client pump or server renderer) runs passes until the
//! scheduler is idle. [`Cached`] memoizes a derived value against the
//! revision it was computed at.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Lock a mutex, recovering the guard if a previous holder panicked.
/// The graph's values stay usable after a poisoned write.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Task = Box<dyn FnOnce() + Send>;

/// Cooperative tick scheduler and pass coordinator.
///
/// One scheduler drives one router tree. All mutation happens on the single
/// thread that pumps it; the scheduler itself is `Send + Sync` so signals,
/// gates, and boundaries can hold handles from wherever their callbacks run.
pub struct Scheduler {
    revision: AtomicU64,
    deferred: Mutex<VecDeque<Task>>,
    pass_requested: AtomicBool,
    /// Outstanding external work (unsettled boundaries, pending gates).
    /// The server renderer waits on this reaching zero.
    external: AtomicUsize,
    notify: Notify,
}

impl Scheduler {
    /// Create a new scheduler at revision zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            revision: AtomicU64::new(0),
            deferred: Mutex::new(VecDeque::new()),
            pass_requested: AtomicBool::new(false),
            external: AtomicUsize::new(0),
            notify: Notify::new(),
        })
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Bump the revision, invalidating every [`Cached`] value keyed below it.
    pub fn bump(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Queue a task for the next tick.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        lock(&self.deferred).push_back(Box::new(task));
        self.notify.notify_waiters();
    }

    /// Request a propagation pass from the owning loop.
    pub fn request_pass(&self) {
        self.pass_requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Consume a pending pass request, if any.
    pub fn take_pass_request(&self) -> bool {
        self.pass_requested.swap(false, Ordering::AcqRel)
    }

    /// Run every task queued before this tick started. Tasks deferred while
    /// the tick runs land on the next tick. Returns how many tasks ran.
    pub fn tick(&self) -> usize {
        let batch: Vec<Task> = {
            let mut queue = lock(&self.deferred);
            queue.drain(..).collect()
        };
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// True while a tick or pass is still owed.
    pub fn has_local_work(&self) -> bool {
        self.pass_requested.load(Ordering::Acquire) || !lock(&self.deferred).is_empty()
    }

    /// Track one unit of external work (e.g. an unresolved async dependency).
    pub fn begin_external(&self) {
        self.external.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark one unit of external work finished.
    pub fn end_external(&self) {
        self.external.fetch_sub(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Outstanding external work count.
    pub fn external_pending(&self) -> usize {
        self.external.load(Ordering::Acquire)
    }

    /// Wait until new local work arrives or all external work finished.
    /// The condition is re-checked after the waiter registers, so a
    /// completion landing just before the wait cannot be lost.
    pub async fn work_available(&self) {
        let notified = self.notify.notified();
        if self.has_local_work() || self.external_pending() == 0 {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("revision", &self.revision())
            .field("pass_requested", &self.pass_requested.load(Ordering::Acquire))
            .field("external", &self.external_pending())
            .finish()
    }
}

/// A revision-stamped settable cell.
///
/// `set` bumps the scheduler revision and requests a pass, so every write
/// is observed by the next propagation pass, never by the current one
/// mid-flight.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    value: Mutex<T>,
    written_at: AtomicU64,
    scheduler: Arc<Scheduler>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Signal<T> {
    /// Create a signal owned by `scheduler`.
    pub fn new(scheduler: Arc<Scheduler>, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                value: Mutex::new(value),
                written_at: AtomicU64::new(scheduler.revision()),
                scheduler,
            }),
        }
    }

    /// Current value (cloned).
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Replace the value, bump the revision, and request a pass.
    pub fn set(&self, value: T) {
        *lock(&self.inner.value) = value;
        let revision = self.inner.scheduler.bump();
        self.inner.written_at.store(revision, Ordering::Release);
        self.inner.scheduler.request_pass();
    }

    /// Revision of the last write.
    pub fn written_at(&self) -> u64 {
        self.inner.written_at.load(Ordering::Acquire)
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("value", &self.get()).finish()
    }
}

/// A derived value cached against the revision it was computed at.
///
/// Recomputes only when the scheduler revision has advanced past the cached
/// one, or after an explicit [`invalidate`](Cached::invalidate).
pub struct Cached<T> {
    slot: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> Cached<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value if it was computed at `revision`, otherwise
    /// run `compute` and cache its result at that revision.
    pub fn get_or_compute(&self, revision: u64, compute: impl FnOnce() -> T) -> T {
        let mut slot = lock(&self.slot);
        if let Some((cached_at, value)) = slot.as_ref() {
            if *cached_at == revision {
                return value.clone();
            }
        }
        let value = compute();
        *slot = Some((revision, value.clone()));
        value
    }

    /// Drop the cached value; the next read recomputes.
    pub fn invalidate(&self) {
        *lock(&self.slot) = None;
    }
}

impl<T: Clone> Default for Cached<T> {
    fn default() -> Self {
        Self::new()
    }
}

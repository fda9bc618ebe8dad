//! Disposal arenas
//!
//! Each staged root owns a [`DisposalArena`]: a flat list of cleanup
//! callbacks released together, exactly once. This replaces implicit
//! scope-based teardown: anything a subtree allocates (interceptor
//! registrations, subscriptions, timers) registers a cleanup here, and
//! disposing the arena releases all of it regardless of how the root was
//! retired (adoption swap or deprecation timeout).

use crate::reactive::lock;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

type Cleanup = Box<dyn FnOnce() + Send>;

/// A shared handle to one disposable resource scope.
///
/// Cloning shares the scope; disposal through any handle retires all of
/// them. Cleanups run in reverse registration order, like drops.
#[derive(Clone)]
pub struct DisposalArena {
    inner: Arc<ArenaInner>,
}

struct ArenaInner {
    disposed: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl DisposalArena {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                disposed: AtomicBool::new(false),
                cleanups: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a cleanup. If the arena is already disposed the callback
    /// runs immediately; a late registration must not outlive the scope.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        if self.is_disposed() {
            cleanup();
            return;
        }
        lock(&self.inner.cleanups).push(Box::new(cleanup));
    }

    /// Whether the arena has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Tear the arena down. Idempotent: only the first call runs cleanups;
    /// later calls return `false` and do nothing.
    pub fn dispose(&self) -> bool {
        if self
            .inner
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("arena already disposed");
            return false;
        }
        // Take the list out of the lock before running: a cleanup may
        // re-enter the arena (e.g. to register on a sibling scope).
        let cleanups: Vec<Cleanup> = {
            let mut guard = lock(&self.inner.cleanups);
            guard.drain(..).collect()
        };
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        true
    }
}

impl Default for DisposalArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DisposalArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalArena")
            .field("disposed", &self.is_disposed())
            .field("pending_cleanups", &lock(&self.inner.cleanups).len())
            .finish()
    }
}

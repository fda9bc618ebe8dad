//! Staging engine
//!
//! Materializes the selected route's subtree off-screen: each candidate is
//! built inside its own disposal arena behind an async boundary, and a
//! readiness flag flips the first time the boundary settles (every pending
//! async dependency resolved once). The adoption gate then decides when the
//! staged root replaces the displayed one.
//!
//! Lifecycle of a staged root:
//!
//! - created when the selected identity changes;
//! - deprecated (flag only, no teardown) when superseded before readiness;
//! - disposed once superseded and either never ready (the settle callback
//!   self-cancels on a future tick, then tears down) or retired by the
//!   adoption gate.

use crate::arena::DisposalArena;
use crate::context::ClientApi;
use crate::node::{BuildCx, HeadCollector, UiNode};
use crate::reactive::{Scheduler, lock};
use crate::route::{RouteDescriptor, RouteId};
use crate::router::Router;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Everything staging needs to build a root.
#[derive(Clone)]
pub struct BuildEnv {
    pub scheduler: Arc<Scheduler>,
    pub api: Arc<ClientApi>,
    pub head: HeadCollector,
}

/// An async boundary: counts pending dependencies registered during a
/// subtree build and fires its settle callback exactly once, when the last
/// one resolves after the build sealed.
#[derive(Clone)]
pub struct AsyncBoundary {
    inner: Arc<BoundaryInner>,
}

struct BoundaryInner {
    pending: AtomicUsize,
    sealed: AtomicBool,
    settled: AtomicBool,
    on_settle: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    scheduler: Arc<Scheduler>,
}

impl AsyncBoundary {
    pub(crate) fn new(scheduler: Arc<Scheduler>, on_settle: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(BoundaryInner {
                pending: AtomicUsize::new(0),
                sealed: AtomicBool::new(false),
                settled: AtomicBool::new(false),
                on_settle: Mutex::new(Some(Box::new(on_settle))),
                scheduler,
            }),
        }
    }

    /// Register one pending dependency. The boundary cannot settle until it
    /// resolves.
    pub fn register(&self) -> AsyncDependency {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.scheduler.begin_external();
        AsyncDependency {
            boundary: self.clone(),
            resolved: AtomicBool::new(false),
        }
    }

    /// Mark the build complete. Settling is only possible from here on.
    pub(crate) fn seal(&self) {
        self.inner.sealed.store(true, Ordering::Release);
        self.maybe_settle();
    }

    /// Whether the boundary has settled.
    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }

    fn resolve_one(&self) {
        self.inner.pending.fetch_sub(1, Ordering::AcqRel);
        self.inner.scheduler.end_external();
        self.maybe_settle();
    }

    fn maybe_settle(&self) {
        if !self.inner.sealed.load(Ordering::Acquire) {
            return;
        }
        if self.inner.pending.load(Ordering::Acquire) != 0 {
            return;
        }
        if self
            .inner
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Some(on_settle) = lock(&self.inner.on_settle).take() {
            on_settle();
        }
    }
}

/// One pending dependency of an [`AsyncBoundary`]. Resolution is
/// idempotent.
pub struct AsyncDependency {
    boundary: AsyncBoundary,
    resolved: AtomicBool,
}

impl AsyncDependency {
    /// Resolve this dependency. Only the first call counts.
    pub fn resolve(&self) {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.boundary.resolve_one();
        }
    }
}

/// A staged route subtree: the built node, its disposal arena, and the
/// readiness/deprecation flags the adoption gate consults.
pub struct StagedRoot {
    id: RouteId,
    node: UiNode,
    arena: DisposalArena,
    boundary: AsyncBoundary,
    ready: Arc<AtomicBool>,
    deprecated: Arc<AtomicBool>,
    routers: Arc<Mutex<Vec<Arc<Router>>>>,
}

impl StagedRoot {
    /// Identity of the descriptor this root was built from.
    pub fn id(&self) -> RouteId {
        self.id
    }

    /// The built subtree.
    pub fn node(&self) -> &UiNode {
        &self.node
    }

    /// Readiness: true once the boundary settled while the root was still
    /// wanted. Monotonic while the root is live; false again after the
    /// arena is torn down, never a panic.
    pub fn is_ready(&self) -> bool {
        !self.arena.is_disposed() && self.ready.load(Ordering::Acquire)
    }

    /// Mark superseded. No teardown happens here: outstanding async work
    /// inside the root keeps running, its eventual settle is simply
    /// ignored and followed by disposal on a later tick.
    pub fn deprecate(&self) {
        self.deprecated.store(true, Ordering::Release);
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated.load(Ordering::Acquire)
    }

    /// Tear down the root's arena. Idempotent.
    pub fn dispose(&self) -> bool {
        self.arena.dispose()
    }

    /// The root's disposal arena.
    pub fn arena(&self) -> &DisposalArena {
        &self.arena
    }

    /// The root's async boundary.
    pub fn boundary(&self) -> &AsyncBoundary {
        &self.boundary
    }

    /// Nested routers mounted during this root's build.
    pub fn routers(&self) -> Vec<Arc<Router>> {
        lock(&self.routers).clone()
    }
}

impl std::fmt::Debug for StagedRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedRoot")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .field("deprecated", &self.is_deprecated())
            .field("disposed", &self.arena.is_disposed())
            .finish()
    }
}

/// Builds staged roots, keyed by selected identity.
pub struct StagingEngine {
    current: Mutex<Option<Arc<StagedRoot>>>,
}

impl StagingEngine {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Reconcile staging with the current selection.
    ///
    /// Unchanged selected identity returns the existing root untouched: no
    /// rebuild, no readiness reset. A changed identity deprecates the
    /// previous root and builds a fresh one.
    pub fn update(
        &self,
        selected: Option<&RouteDescriptor>,
        env: &BuildEnv,
    ) -> Option<Arc<StagedRoot>> {
        let mut current = lock(&self.current);
        let Some(descriptor) = selected else {
            if let Some(previous) = current.take() {
                previous.deprecate();
            }
            return None;
        };

        if let Some(existing) = current.as_ref() {
            if existing.id() == descriptor.id() {
                return Some(existing.clone());
            }
        }
        if let Some(previous) = current.take() {
            previous.deprecate();
        }

        let root = build_root(descriptor, env);
        debug!(route = %descriptor.id(), "staged new root");
        *current = Some(root.clone());
        Some(root)
    }

    /// The currently staged root, if any.
    pub fn current(&self) -> Option<Arc<StagedRoot>> {
        lock(&self.current).clone()
    }

    /// Drop and deprecate the staged root (router teardown).
    pub fn clear(&self) -> Option<Arc<StagedRoot>> {
        let root = lock(&self.current).take();
        if let Some(root) = &root {
            root.deprecate();
        }
        root
    }
}

impl Default for StagingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn build_root(descriptor: &RouteDescriptor, env: &BuildEnv) -> Arc<StagedRoot> {
    let arena = DisposalArena::new();
    let ready = Arc::new(AtomicBool::new(false));
    let deprecated = Arc::new(AtomicBool::new(false));
    let routers = Arc::new(Mutex::new(Vec::new()));

    let on_settle = {
        let ready = ready.clone();
        let deprecated = deprecated.clone();
        let arena = arena.clone();
        let scheduler = env.scheduler.clone();
        move || {
            if deprecated.load(Ordering::Acquire) {
                // Superseded before settling: never flip ready. Disposal
                // is pushed to the next tick so a settle landing inside
                // the current propagation pass cannot recurse into it.
                scheduler.defer(move || {
                    arena.dispose();
                });
            } else {
                ready.store(true, Ordering::Release);
                scheduler.bump();
                scheduler.request_pass();
            }
        }
    };

    let boundary = AsyncBoundary::new(env.scheduler.clone(), on_settle);
    let cx = BuildCx::new(
        arena.clone(),
        boundary.clone(),
        env.head.clone(),
        env.api.clone(),
        env.scheduler.clone(),
        routers.clone(),
    );

    let node = match (descriptor.children())(&cx) {
        Ok(node) => node,
        Err(err) => {
            error!(
                route = %descriptor.id(),
                error = ?err,
                "route subtree failed to build; rendering fallback"
            );
            UiNode::Empty
        }
    };

    // Every build carries one instant dependency resolved on the next
    // tick, so readiness flips asynchronously even for fully synchronous
    // subtrees.
    let instant = boundary.register();
    env.scheduler.defer(move || instant.resolve());
    boundary.seal();

    Arc::new(StagedRoot {
        id: descriptor.id(),
        node,
        arena,
        boundary,
        ready,
        deprecated,
        routers,
    })
}

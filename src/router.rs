//! Router node
//!
//! Composes the pipeline: collect → select → stage → adopt. A router owns
//! its child list, a selector, a staging engine, and an adoption gate; one
//! [`pass`](Router::pass) runs the pipeline once against the latest state.
//!
//! Nested routing: [`parent_route`] wraps an inner router as a route whose
//! predicate is "the inner router currently matches". The inner router is
//! built eagerly on the client and lazily (on first predicate poll) on the
//! server, and at most once either way; it embeds its live output into the
//! parent tree through a late-bound node.

use crate::adoption::AdoptionGate;
use crate::node::{BuildCx, DynNode, LayoutFn, UiNode};
use crate::reactive::{Cached, lock};
use crate::route::{PredicateFn, RouteDescriptor, RouterChild};
use crate::select::{Selection, Selector, collect_routes};
use crate::staging::{BuildEnv, StagingEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

type MatchCallback = Box<dyn Fn(bool) + Send + Sync>;

/// One router node.
pub struct Router {
    env: BuildEnv,
    children: Mutex<Vec<RouterChild>>,
    routes: Cached<Vec<RouteDescriptor>>,
    selector: Selector,
    staging: StagingEngine,
    gate: AdoptionGate,
    layout: Option<LayoutFn>,
    on_match_change: Mutex<Option<MatchCallback>>,
    last_match: Mutex<Option<bool>>,
}

impl Router {
    pub fn new(env: BuildEnv) -> Self {
        let mode = env.api.mode();
        Self {
            env,
            children: Mutex::new(Vec::new()),
            routes: Cached::new(),
            selector: Selector::new(),
            staging: StagingEngine::new(),
            gate: AdoptionGate::new(mode),
            layout: None,
            on_match_change: Mutex::new(None),
            last_match: Mutex::new(None),
        }
    }

    /// Set the layout wrapped around this router's output.
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn with_layout(mut self, layout: impl Fn(UiNode) -> UiNode + Send + Sync + 'static) -> Self {
        self.layout = Some(Arc::new(layout));
        self
    }

    /// Observe match-state changes. Fires on the first pass and whenever
    /// "some route matched" flips.
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn on_match_change(self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        *lock(&self.on_match_change) = Some(Box::new(callback));
        self
    }

    /// Set the initial child list.
    #[must_use = "This method returns a new Router and does not modify self"]
    pub fn with_children(self, children: Vec<RouterChild>) -> Self {
        *lock(&self.children) = children;
        self
    }

    /// Replace the child list reactively.
    pub fn set_children(&self, children: Vec<RouterChild>) {
        *lock(&self.children) = children;
        self.env.scheduler.bump();
        self.env.scheduler.request_pass();
    }

    /// The environment this router runs in.
    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    /// Run one propagation pass: collect, select, stage, adopt, then drive
    /// any nested routers mounted under the adopted root.
    pub fn pass(&self) {
        let selection = self.select();
        let staged = self.staging.update(selection.route.as_ref(), &self.env);
        let adopted = self.gate.adopt(staged);

        if let Some(root) = &adopted {
            for nested in root.routers() {
                nested.pass();
            }
        }
    }

    fn select(&self) -> Selection {
        let revision = self.env.scheduler.revision();
        let routes = self
            .routes
            .get_or_compute(revision, || collect_routes(&lock(&self.children)));
        let selection = self.selector.select(&routes);
        self.report_match(selection.route.is_some());
        selection
    }

    /// Re-run collection and selection only: no staging, no adoption.
    /// Parent-route predicates poll this to ask "would you match?".
    pub fn refresh_selection(&self) -> bool {
        self.select().route.is_some()
    }

    /// Whether the latest selection matched any route.
    pub fn matched(&self) -> bool {
        self.selector.current().is_some()
    }

    /// The node currently rendered: the adopted root's subtree behind the
    /// layout, or nothing when no route is selected.
    pub fn output(&self) -> UiNode {
        if self.selector.current().is_none() {
            return UiNode::Empty;
        }
        let node = self
            .gate
            .current()
            .map(|root| root.node().clone())
            .unwrap_or(UiNode::Empty);
        match &self.layout {
            Some(layout) => layout(node),
            None => node,
        }
    }

    /// The adopted root, if any. Exposed for the render loop and tests.
    pub fn adopted(&self) -> Option<Arc<crate::staging::StagedRoot>> {
        self.gate.current()
    }

    /// The staged root, if any. Exposed for tests.
    pub fn staged(&self) -> Option<Arc<crate::staging::StagedRoot>> {
        self.staging.current()
    }

    /// Retire everything this router holds: the staged root is deprecated,
    /// the adopted root disposed. Runs when an enclosing scope tears down.
    pub fn teardown(&self) {
        if let Some(staged) = self.staging.clear() {
            // A staged-but-unadopted root has no other owner left.
            if staged.is_ready() || staged.boundary().is_settled() {
                staged.dispose();
            }
        }
        self.gate.clear();
        debug!("router torn down");
    }

    fn report_match(&self, matched: bool) {
        let mut last = lock(&self.last_match);
        if *last == Some(matched) {
            return;
        }
        *last = Some(matched);
        if let Some(callback) = lock(&self.on_match_change).as_ref() {
            callback(matched);
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("matched", &self.matched())
            .field("children", &lock(&self.children).len())
            .finish()
    }
}

struct ParentState {
    env: BuildEnv,
    layout: Option<LayoutFn>,
    children: Vec<RouterChild>,
    inner: Mutex<Option<Arc<Router>>>,
    matched: Arc<AtomicBool>,
}

impl ParentState {
    /// Build the inner router at most once.
    fn ensure_inner(self: &Arc<Self>) -> Arc<Router> {
        let mut guard = lock(&self.inner);
        if let Some(router) = guard.as_ref() {
            return router.clone();
        }
        let matched = self.matched.clone();
        let mut router = Router::new(self.env.clone())
            .on_match_change(move |m| matched.store(m, Ordering::Release))
            .with_children(self.children.clone());
        if let Some(layout) = &self.layout {
            let layout = layout.clone();
            router = router.with_layout(move |node| layout(node));
        }
        let router = Arc::new(router);
        router.refresh_selection();
        *guard = Some(router.clone());
        router
    }
}

/// Declare a nested route: an inner router exposed as a route of the outer
/// one.
///
/// - `when`: optional hard override; `false` short-circuits without
///   consulting the inner router at all.
/// - `layout`: wrapped around the inner router's output.
/// - `children`: the inner router's child list.
///
/// The descriptor's predicate asks the inner router whether it would match
/// the current state; its subtree mounts the inner router and embeds its
/// live output.
pub fn parent_route(
    env: &BuildEnv,
    when: Option<PredicateFn>,
    layout: Option<LayoutFn>,
    children: Vec<RouterChild>,
) -> RouterChild {
    let state = Arc::new(ParentState {
        env: env.clone(),
        layout,
        children,
        inner: Mutex::new(None),
        matched: Arc::new(AtomicBool::new(false)),
    });

    // Client: the inner router exists from declaration. Server: deferred
    // to the first predicate poll.
    if !env.api.mode().is_server() {
        state.ensure_inner();
    }

    let predicate: PredicateFn = {
        let state = state.clone();
        Arc::new(move || {
            if let Some(when) = &when {
                if !when() {
                    return false;
                }
            }
            state.ensure_inner().refresh_selection()
        })
    };

    let children_fn = {
        let state = state.clone();
        move |cx: &BuildCx| -> crate::error::RouterResult<UiNode> {
            let inner = state.ensure_inner();
            cx.mount_router(inner.clone());
            {
                let inner = inner.clone();
                cx.on_cleanup(move || inner.teardown());
            }
            inner.pass();
            let inner = inner.clone();
            Ok(UiNode::Dynamic(DynNode::new(move || inner.output())))
        }
    };

    RouterChild::Route(RouteDescriptor::new(predicate, Arc::new(children_fn)))
}

/// Convenience: a [`parent_route`] with no override predicate and no
/// layout.
pub fn nested_routes(env: &BuildEnv, children: Vec<RouterChild>) -> RouterChild {
    parent_route(env, None, None, children)
}

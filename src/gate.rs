//! Gate middleware routes
//!
//! A gate route wraps one step of external request-handling logic as a
//! predicate-only pseudo-route. While the middleware has not decided, the
//! gate matches: later routes are not surfaced. The decision settles
//! exactly once, from whichever happens first:
//!
//! - the middleware calls `proceed`: the gate stops matching and later
//!   routes become reachable;
//! - the response finishes, closes, or errors: not-proceeded; the gate
//!   keeps matching (and produces nothing) because a response was already
//!   written;
//! - the middleware fails synchronously: not-proceeded.
//!
//! A response that already went out before the first poll resolves
//! not-proceeded immediately, without invoking the middleware.
//!
//! Gate routes are only meaningful during request handling; declared on
//! the client they contribute a plain empty node the collector skips.

use crate::context::ClientApi;
use crate::error::RouterResult;
use crate::http::{ResponseHandle, ServerRequest};
use crate::node::{BuildCx, UiNode};
use crate::reactive::{Scheduler, lock};
use crate::route::{RouteDescriptor, RouterChild};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Signals that request handling should continue past this gate.
/// Idempotent; only the first call counts.
pub type ProceedFn = Arc<dyn Fn() + Send + Sync>;

/// One step of external request-handling logic. Returning an error is
/// treated as not-proceeded.
pub type GateMiddlewareFn = Arc<
    dyn Fn(Arc<dyn ServerRequest>, Arc<dyn ResponseHandle>, ProceedFn) -> RouterResult<()>
        + Send
        + Sync,
>;

enum GateState {
    Unevaluated { middleware: GateMiddlewareFn },
    Pending,
    Settled { proceeded: bool },
}

struct GateInner {
    scheduler: Arc<Scheduler>,
    request: Arc<dyn ServerRequest>,
    response: Arc<dyn ResponseHandle>,
    state: Mutex<GateState>,
}

/// The settle-once state machine behind a gate route's predicate.
#[derive(Clone)]
pub struct GateRoute {
    inner: Arc<GateInner>,
}

impl GateRoute {
    pub fn new(
        scheduler: Arc<Scheduler>,
        request: Arc<dyn ServerRequest>,
        response: Arc<dyn ResponseHandle>,
        middleware: GateMiddlewareFn,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                scheduler,
                request,
                response,
                state: Mutex::new(GateState::Unevaluated { middleware }),
            }),
        }
    }

    /// Poll the gate predicate. The first poll evaluates the middleware;
    /// later polls read the cached resolution.
    pub fn poll(&self) -> bool {
        let middleware = {
            let mut state = lock(&self.inner.state);
            let middleware = match &*state {
                GateState::Settled { proceeded } => return !*proceeded,
                GateState::Pending => return true,
                GateState::Unevaluated { middleware } => middleware.clone(),
            };
            *state = GateState::Pending;
            self.inner.scheduler.begin_external();
            middleware
        };

        // A response that already went out means this request was handled:
        // resolve not-proceeded without running the middleware.
        if self.inner.response.headers_sent() || self.inner.response.body_ended() {
            debug!("response already produced; gate resolves not-proceeded");
            self.settle(false);
            return true;
        }

        {
            let gate = self.clone();
            self.inner.response.on_end(Box::new(move |reason| {
                debug!(?reason, "response ended while gate was pending");
                gate.settle(false);
            }));
        }

        let proceed: ProceedFn = {
            let gate = self.clone();
            Arc::new(move || gate.settle(true))
        };

        let result = (middleware)(
            self.inner.request.clone(),
            self.inner.response.clone(),
            proceed,
        );
        if let Err(err) = result {
            warn!(error = ?err, "gate middleware failed; treating as not-proceeded");
            self.settle(false);
        }

        // `proceed` may have run synchronously.
        match &*lock(&self.inner.state) {
            GateState::Settled { proceeded } => !*proceeded,
            _ => true,
        }
    }

    /// Whether the gate has resolved.
    pub fn is_settled(&self) -> bool {
        matches!(&*lock(&self.inner.state), GateState::Settled { .. })
    }

    fn settle(&self, proceeded: bool) {
        let was_pending = {
            let mut state = lock(&self.inner.state);
            if matches!(&*state, GateState::Settled { .. }) {
                return;
            }
            let was_pending = matches!(&*state, GateState::Pending);
            *state = GateState::Settled { proceeded };
            was_pending
        };
        if was_pending {
            self.inner.scheduler.end_external();
        }
        debug!(proceeded, "gate middleware settled");
        self.inner.scheduler.bump();
        self.inner.scheduler.request_pass();
    }
}

impl std::fmt::Debug for GateRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*lock(&self.inner.state) {
            GateState::Unevaluated { .. } => "unevaluated",
            GateState::Pending => "pending",
            GateState::Settled { proceeded: true } => "proceeded",
            GateState::Settled { proceeded: false } => "not-proceeded",
        };
        f.debug_struct("GateRoute").field("state", &state).finish()
    }
}

/// Declare a gate route over `middleware`.
///
/// Outside request handling (no request/response on the API) this is a
/// plain empty node, not a route.
pub fn gate_route(
    api: &Arc<ClientApi>,
    middleware: impl Fn(Arc<dyn ServerRequest>, Arc<dyn ResponseHandle>, ProceedFn) -> RouterResult<()>
        + Send
        + Sync
        + 'static,
) -> RouterChild {
    let Some(ssr) = api.ssr() else {
        return RouterChild::Node(UiNode::Empty);
    };

    let gate = GateRoute::new(
        api.scheduler().clone(),
        ssr.request.clone(),
        ssr.response.clone(),
        Arc::new(middleware),
    );

    let predicate = {
        let gate = gate.clone();
        Arc::new(move || gate.poll())
    };
    let children = Arc::new(|_cx: &BuildCx| -> RouterResult<UiNode> { Ok(UiNode::Empty) });

    RouterChild::Route(RouteDescriptor::new(predicate, children))
}

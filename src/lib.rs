//! staged-router
//!
//! Client/server router for reactive UI applications. Matches a
//! declarative, nested route tree against navigation state, pre-resolves
//! the matched subtree off-screen, and atomically swaps it in only once
//! ready: no flicker on navigation, instant output on first load and
//! server render.
//!
//! ## Pipeline
//!
//! declaration → collect → select → stage → adopt → rendered output
//!
//! - **Collection/selection** ([`collect_routes`], [`Selector`]): the
//!   first declared route whose predicate is true wins; selection is
//!   memoized by identity.
//! - **Staging** ([`StagingEngine`]): the selected subtree builds inside
//!   its own disposal arena behind an async boundary; readiness flips once
//!   every pending dependency resolved.
//! - **Adoption** ([`AdoptionGate`]): the staged root replaces the
//!   displayed one once ready (immediately on the server).
//! - **Navigation** ([`NavigationController`]): current path, monotonic
//!   history index, `before_goto` interception, per-index scroll
//!   persistence.
//! - **Gate routes** ([`gate_route`]): request-handling middleware as a
//!   pseudo-route that defers selection until it proceeds or responds.
//! - **Server rendering** ([`render_to_document`]): runs the router to
//!   quiescence and emits a complete HTML document, falling through to
//!   the host HTTP layer when nothing matched.

mod adoption;
mod arena;
mod context;
mod error;
mod gate;
mod http;
mod navigation;
mod node;
mod plugin;
mod reactive;
mod route;
mod router;
mod select;
mod server;
mod staging;

#[cfg(test)]
mod tests;

pub use adoption::{AdoptionGate, RenderMode};
pub use arena::DisposalArena;
pub use context::{ClientApi, PreparedFetch, SsrHandles, prepare_ssr_fetch};
pub use error::{RouterError, RouterErrorCode, RouterResult};
pub use gate::{GateMiddlewareFn, GateRoute, ProceedFn, gate_route};
pub use self::http::{
    BufferedResponse, EndCallback, EndReason, RequestParts, ResponseHandle, ServerRequest,
};
pub use navigation::{
    HistoryAction, HistoryDriver, InterceptorFn, InterceptorGuard, MemoryHistory,
    NavigationController, SCROLL_STORAGE_KEY, ScrollPosition, ScrollStore, SessionStorage,
    Spawner, StorageArea, tokio_spawner,
};
pub use node::{
    AsyncSlot, BuildCx, ChildrenFn, DynNode, HeadCollector, LayoutFn, SlotWriter, UiNode,
};
pub use plugin::{
    AppPlugin, ClientRuntime, RoutesPlugin, bootstrap_client, bootstrap_client_with_storage,
    route_providers,
};
pub use reactive::{Cached, Scheduler, Signal};
pub use route::{
    PredicateFn, RouteDescriptor, RouteId, RouterChild, always_route, end_route,
};
pub use router::{Router, nested_routes, parent_route};
pub use select::{Selection, Selector, collect_routes};
pub use server::{
    DocumentOptions, NextFn, RenderOutcome, render_to_document, server_middleware,
};
pub use staging::{
    AsyncBoundary, AsyncDependency, BuildEnv, StagedRoot, StagingEngine,
};

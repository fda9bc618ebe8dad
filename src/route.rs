//! Route declaration
//!
//! Routes are declared as explicit tagged variants: a router child is
//! either a [`RouteDescriptor`] or a plain node the collector skips. There
//! is no runtime introspection of opaque children; the declaration layer
//! says what is a route.
//!
//! Descriptors are replaced wholesale when a child list changes, never
//! mutated in place; downstream stages compare them by [`RouteId`], not by
//! value.

use crate::node::{BuildCx, ChildrenFn, UiNode};
use crate::error::RouterResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A unique, time-ordered route identifier based on UUID v7.
///
/// Identity is what selection memoizes on: as long as a descriptor keeps
/// its id across recomputes, downstream staging is not re-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(Uuid);

impl RouteId {
    /// Create a new route ID using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a route ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a route ID from a string.
    ///
    /// Accepts both formats:
    /// - With prefix: "route_01234567-89ab-7cde-8f01-234567890abc"
    /// - Without prefix: "01234567-89ab-7cde-8f01-234567890abc"
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid_str = s.strip_prefix("route_").unwrap_or(s);
        Uuid::parse_str(uuid_str).map(Self)
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route_{}", self.0)
    }
}

/// Pollable boolean predicate deciding whether a route currently matches.
///
/// Predicates are polled during selection, in declaration order, stopping
/// at the first `true`. A predicate may have evaluation side effects (the
/// gate route does); the short-circuit guarantees it is not polled once an
/// earlier route matched.
pub type PredicateFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// One declared route: a predicate, a lazy subtree producer, and a stable
/// identity.
#[derive(Clone)]
pub struct RouteDescriptor {
    id: RouteId,
    predicate: PredicateFn,
    children: ChildrenFn,
}

impl RouteDescriptor {
    pub fn new(predicate: PredicateFn, children: ChildrenFn) -> Self {
        Self {
            id: RouteId::new(),
            predicate,
            children,
        }
    }

    /// Build with an explicit identity. Useful when the declaration layer
    /// re-creates descriptors each pass but wants staging continuity.
    pub fn with_id(id: RouteId, predicate: PredicateFn, children: ChildrenFn) -> Self {
        Self {
            id,
            predicate,
            children,
        }
    }

    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Poll the predicate.
    pub fn matches(&self) -> bool {
        (self.predicate)()
    }

    /// The lazy subtree producer.
    pub fn children(&self) -> &ChildrenFn {
        &self.children
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("id", &self.id)
            .finish()
    }
}

/// A child of a router node: a route, or a plain node the collector skips.
#[derive(Clone)]
pub enum RouterChild {
    Route(RouteDescriptor),
    Node(UiNode),
}

impl fmt::Debug for RouterChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route(route) => f.debug_tuple("Route").field(&route.id()).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

/// Declare a leaf route: a predicate plus a component producer.
///
/// # Example
/// ```rust,ignore
/// let home = end_route(
///     move || api.current_path() == "/",
///     |_cx| Ok(UiNode::raw("<h1>Home</h1>")),
/// );
/// ```
pub fn end_route(
    when: impl Fn() -> bool + Send + Sync + 'static,
    component: impl Fn(&BuildCx) -> RouterResult<UiNode> + Send + Sync + 'static,
) -> RouterChild {
    RouterChild::Route(RouteDescriptor::new(
        Arc::new(when),
        Arc::new(component),
    ))
}

/// Declare a leaf route that always matches. Placed last, it acts as the
/// catch-all.
pub fn always_route(
    component: impl Fn(&BuildCx) -> RouterResult<UiNode> + Send + Sync + 'static,
) -> RouterChild {
    end_route(|| true, component)
}

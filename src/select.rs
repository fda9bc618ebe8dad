//! Route collection and selection
//!
//! The collector filters a router node's children down to route
//! descriptors, preserving declaration order. The selector picks the first
//! descriptor whose predicate is true, short-circuiting (predicates after
//! the first match are not polled in that pass), and memoizes the chosen
//! identity so an unchanged selection triggers no downstream work.

use crate::reactive::lock;
use crate::route::{RouteDescriptor, RouteId, RouterChild};
use std::sync::Mutex;
use tracing::debug;

/// Filter children down to route descriptors, order preserved.
pub fn collect_routes(children: &[RouterChild]) -> Vec<RouteDescriptor> {
    children
        .iter()
        .filter_map(|child| match child {
            RouterChild::Route(route) => Some(route.clone()),
            RouterChild::Node(_) => None,
        })
        .collect()
}

/// Outcome of one selection pass.
#[derive(Clone, Debug)]
pub struct Selection {
    /// The first descriptor whose predicate was true, if any.
    pub route: Option<RouteDescriptor>,
    /// Whether the selected identity differs from the previous pass.
    pub changed: bool,
}

/// First-match route selector with identity memoization.
pub struct Selector {
    last: Mutex<Option<RouteId>>,
}

impl Selector {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Pick the first route whose predicate is currently true.
    ///
    /// Polls predicates in list order and stops at the first `true`.
    /// `changed` reflects identity, not value: re-selecting the same id is
    /// reported unchanged even if unrelated list entries differ.
    pub fn select(&self, routes: &[RouteDescriptor]) -> Selection {
        let mut selected = None;
        for route in routes {
            if route.matches() {
                selected = Some(route.clone());
                break;
            }
        }

        let current_id = selected.as_ref().map(RouteDescriptor::id);
        let mut last = lock(&self.last);
        let changed = *last != current_id;
        if changed {
            debug!(
                from = ?*last,
                to = ?current_id,
                "route selection changed"
            );
            *last = current_id;
        }

        Selection {
            route: selected,
            changed,
        }
    }

    /// The identity selected by the most recent pass.
    pub fn current(&self) -> Option<RouteId> {
        *lock(&self.last)
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

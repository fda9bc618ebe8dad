//! Adoption gate
//!
//! Holds the root currently rendered and decides, each pass, whether to
//! keep it or swap in the staged candidate. The rules:
//!
//! - no candidate: dispose the current root, show nothing;
//! - server render: adopt the candidate immediately, no delay;
//! - client: adopt the candidate once it is ready, or when nothing is
//!   adopted yet; otherwise keep the current root on screen and leave the
//!   candidate staged in the background.
//!
//! The gate never disposes the root it is about to return, and a
//! deprecated candidate is never adopted.

use crate::reactive::lock;
use crate::staging::StagedRoot;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Which rendering environment the router runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Browser-side: staged candidates are held until ready.
    Client,
    /// Server-side render: candidates are adopted immediately.
    Server,
}

impl RenderMode {
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server)
    }
}

/// Keep-or-swap decision point; owns the adopted root.
pub struct AdoptionGate {
    mode: RenderMode,
    current: Mutex<Option<Arc<StagedRoot>>>,
    /// Candidate seen on the previous pass. Lets the gate retire a root
    /// that was superseded after becoming ready but before being adopted;
    /// neither the deprecation timeout nor a swap would reach it.
    last_candidate: Mutex<Option<Arc<StagedRoot>>>,
}

impl AdoptionGate {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            current: Mutex::new(None),
            last_candidate: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// The adopted root, if any.
    pub fn current(&self) -> Option<Arc<StagedRoot>> {
        lock(&self.current).clone()
    }

    /// Run one keep-or-swap decision and return the root to render.
    pub fn adopt(&self, candidate: Option<Arc<StagedRoot>>) -> Option<Arc<StagedRoot>> {
        let abandoned = {
            let mut last = lock(&self.last_candidate);
            std::mem::replace(&mut *last, candidate.clone())
        };

        let adopted = self.decide(candidate.as_ref());

        // A previous candidate that is no longer the candidate, is not on
        // screen, and was superseded has no other owner left to retire it.
        if let Some(stale) = abandoned {
            let is_candidate = candidate
                .as_ref()
                .map(|c| Arc::ptr_eq(c, &stale))
                .unwrap_or(false);
            let is_adopted = adopted
                .as_ref()
                .map(|a| Arc::ptr_eq(a, &stale))
                .unwrap_or(false);
            if !is_candidate && !is_adopted && stale.is_deprecated() {
                stale.dispose();
            }
        }

        adopted
    }

    fn decide(&self, candidate: Option<&Arc<StagedRoot>>) -> Option<Arc<StagedRoot>> {
        let mut current = lock(&self.current);

        let Some(candidate) = candidate else {
            if let Some(previous) = current.take() {
                debug!(route = %previous.id(), "no candidate; disposing adopted root");
                previous.dispose();
            }
            return None;
        };

        if self.mode.is_server() {
            return Self::swap(&mut current, candidate);
        }

        // A deprecated candidate must never be adopted, and a not-yet-ready
        // one only replaces an empty screen.
        let adoptable =
            !candidate.is_deprecated() && (candidate.is_ready() || current.is_none());
        if adoptable {
            Self::swap(&mut current, candidate)
        } else {
            current.clone()
        }
    }

    fn swap(
        current: &mut Option<Arc<StagedRoot>>,
        candidate: &Arc<StagedRoot>,
    ) -> Option<Arc<StagedRoot>> {
        if let Some(previous) = current.take() {
            // Never dispose the instance being returned.
            if !Arc::ptr_eq(&previous, candidate) {
                debug!(
                    from = %previous.id(),
                    to = %candidate.id(),
                    "adopting staged root"
                );
                previous.dispose();
            }
        }
        *current = Some(candidate.clone());
        Some(candidate.clone())
    }

    /// Dispose the adopted root (router teardown).
    pub fn clear(&self) {
        if let Some(previous) = lock(&self.current).take() {
            previous.dispose();
        }
        lock(&self.last_candidate).take();
    }
}

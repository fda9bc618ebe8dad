//! Navigation and history
//!
//! Client-side navigation state: the current path, a monotonically
//! increasing history index, per-index scroll positions, and the
//! `before_goto` interception hooks. Platform access goes through the
//! [`HistoryDriver`] trait; [`MemoryHistory`] backs the tests and any
//! headless host.
//!
//! Scroll positions persist as flat JSON (`{"<index>": {"x":..,"y":..}}`)
//! under one well-known storage key. The default storage area is
//! session-scoped and the in-memory table is LRU-bounded.

use crate::arena::DisposalArena;
use crate::error::RouterResult;
use crate::reactive::{Scheduler, Signal, lock};
use futures::future::{BoxFuture, join_all};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Storage key for the scroll table.
pub const SCROLL_STORAGE_KEY: &str = "scroll";

/// Upper bound on retained scroll entries.
const SCROLL_TABLE_CAPACITY: usize = 128;

/// A window scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

impl ScrollPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Key/value persistence for navigation state.
///
/// The crate ships a session-scoped in-memory implementation; a host may
/// back this with durable platform storage instead.
pub trait StorageArea: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: &str);
}

/// In-memory storage living as long as the session.
#[derive(Default)]
pub struct SessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for SessionStorage {
    fn load(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) {
        lock(&self.entries).insert(key.to_owned(), value.to_owned());
    }
}

/// Per-history-index scroll table, LRU-bounded, persisted as flat JSON.
pub struct ScrollStore {
    entries: Mutex<LruCache<u64, ScrollPosition>>,
    storage: Arc<dyn StorageArea>,
}

impl ScrollStore {
    /// Load the table from storage. Unparseable content starts empty.
    pub fn new(storage: Arc<dyn StorageArea>) -> Self {
        let capacity = NonZeroUsize::new(SCROLL_TABLE_CAPACITY.max(1)).unwrap();
        let mut entries = LruCache::new(capacity);
        if let Some(raw) = storage.load(SCROLL_STORAGE_KEY) {
            if let Ok(table) = serde_json::from_str::<HashMap<String, ScrollPosition>>(&raw) {
                let mut indexed: Vec<(u64, ScrollPosition)> = table
                    .into_iter()
                    .filter_map(|(key, position)| key.parse::<u64>().ok().map(|i| (i, position)))
                    .collect();
                indexed.sort_by_key(|(index, _)| *index);
                for (index, position) in indexed {
                    entries.put(index, position);
                }
            }
        }
        Self {
            entries: Mutex::new(entries),
            storage,
        }
    }

    pub fn get(&self, index: u64) -> Option<ScrollPosition> {
        lock(&self.entries).get(&index).copied()
    }

    pub fn set(&self, index: u64, position: ScrollPosition) {
        lock(&self.entries).put(index, position);
        self.persist();
    }

    fn persist(&self) {
        let table: HashMap<String, ScrollPosition> = lock(&self.entries)
            .iter()
            .map(|(index, position)| (index.to_string(), *position))
            .collect();
        match serde_json::to_string(&table) {
            Ok(json) => self.storage.store(SCROLL_STORAGE_KEY, &json),
            Err(err) => debug!(error = %err, "failed to serialize scroll table"),
        }
    }
}

/// How a navigation lands in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Push,
    Replace,
}

/// Platform navigation surface.
pub trait HistoryDriver: Send + Sync {
    /// Current path + query + fragment.
    fn location(&self) -> String;

    /// Origin of the current document, e.g. `"https://app.example"`.
    fn origin(&self) -> String;

    /// Record a navigation in platform history, tagged with its index.
    fn apply(&self, action: HistoryAction, index: u64, path: &str);

    /// Leave the application with a full-page navigation.
    fn assign_external(&self, url: &str);

    /// Current window scroll offset.
    fn scroll_position(&self) -> ScrollPosition;

    /// Scroll the window.
    fn scroll_to(&self, position: ScrollPosition);
}

/// In-memory history for tests and headless hosts.
pub struct MemoryHistory {
    origin: String,
    entries: Mutex<Vec<(u64, String)>>,
    external: Mutex<Vec<String>>,
    scroll: Mutex<ScrollPosition>,
}

impl MemoryHistory {
    pub fn new(origin: impl Into<String>, initial_path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            entries: Mutex::new(vec![(0, initial_path.into())]),
            external: Mutex::new(Vec::new()),
            scroll: Mutex::new(ScrollPosition::default()),
        }
    }

    /// All recorded entries, oldest first.
    pub fn entries(&self) -> Vec<(u64, String)> {
        lock(&self.entries).clone()
    }

    pub fn entry_count(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Full-page navigations requested through this driver.
    pub fn external_assignments(&self) -> Vec<String> {
        lock(&self.external).clone()
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("http://localhost", "/")
    }
}

impl HistoryDriver for MemoryHistory {
    fn location(&self) -> String {
        lock(&self.entries)
            .last()
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| "/".to_owned())
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn apply(&self, action: HistoryAction, index: u64, path: &str) {
        let mut entries = lock(&self.entries);
        match action {
            HistoryAction::Push => entries.push((index, path.to_owned())),
            HistoryAction::Replace => {
                entries.pop();
                entries.push((index, path.to_owned()));
            }
        }
    }

    fn assign_external(&self, url: &str) {
        lock(&self.external).push(url.to_owned());
    }

    fn scroll_position(&self) -> ScrollPosition {
        *lock(&self.scroll)
    }

    fn scroll_to(&self, position: ScrollPosition) {
        *lock(&self.scroll) = position;
    }
}

/// Async navigation interceptor. An `Err` vetoes the navigation.
pub type InterceptorFn =
    Arc<dyn Fn(&str, bool) -> BoxFuture<'static, RouterResult<()>> + Send + Sync>;

/// Runs futures the controller hands off (interceptor joins). Defaults to
/// `tokio::spawn` via [`tokio_spawner`].
pub type Spawner = Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>;

/// A [`Spawner`] over the current tokio runtime.
pub fn tokio_spawner() -> Spawner {
    Arc::new(|future| {
        tokio::spawn(future);
    })
}

/// Unregisters its interceptor when dropped, tying the registration to the
/// lifetime of the scope that made it.
pub struct InterceptorGuard {
    id: u64,
    state: Weak<NavState>,
}

impl InterceptorGuard {
    /// Tie the registration to an arena: disposing the arena unregisters.
    pub fn attach_to(self, arena: &DisposalArena) {
        arena.on_cleanup(move || drop(self));
    }
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state.interceptors).retain(|(id, _)| *id != self.id);
        }
    }
}

struct NavState {
    driver: Arc<dyn HistoryDriver>,
    path: Signal<String>,
    current_index: AtomicU64,
    next_index: AtomicU64,
    scroll: ScrollStore,
    interceptors: Mutex<Vec<(u64, InterceptorFn)>>,
    interceptor_seq: AtomicU64,
    goto_seq: AtomicU64,
    spawner: Spawner,
}

/// Owns current path, drives navigation, runs interception hooks, and
/// persists scroll position. Client-only; the server API stubs this out.
#[derive(Clone)]
pub struct NavigationController {
    inner: Arc<NavState>,
}

impl NavigationController {
    pub fn new(
        scheduler: Arc<Scheduler>,
        driver: Arc<dyn HistoryDriver>,
        storage: Arc<dyn StorageArea>,
        spawner: Spawner,
    ) -> Self {
        let initial_path = driver.location();
        Self {
            inner: Arc::new(NavState {
                path: Signal::new(scheduler, initial_path),
                driver,
                current_index: AtomicU64::new(0),
                next_index: AtomicU64::new(1),
                scroll: ScrollStore::new(storage),
                interceptors: Mutex::new(Vec::new()),
                interceptor_seq: AtomicU64::new(0),
                goto_seq: AtomicU64::new(0),
                spawner,
            }),
        }
    }

    /// Current path + query + fragment.
    pub fn current_path(&self) -> String {
        self.inner.path.get()
    }

    /// Absolute URL of the current location.
    pub fn url(&self) -> String {
        format!("{}{}", self.inner.driver.origin(), self.current_path())
    }

    /// Index of the current history entry. Monotonic across the session.
    pub fn history_index(&self) -> u64 {
        self.inner.current_index.load(Ordering::Acquire)
    }

    /// Scroll position recorded for the current history entry.
    pub fn scroll_entry(&self) -> ScrollPosition {
        self.inner
            .scroll
            .get(self.history_index())
            .unwrap_or_default()
    }

    /// Navigate to `path`.
    ///
    /// Non-rooted paths outside the document origin leave the application
    /// via a full-page navigation. Navigating to the current path is a
    /// no-op. Otherwise the target is pushed (or replaced) into history
    /// under a fresh index, after every registered interceptor resolved,
    /// and only if no newer `goto` superseded this one in the meantime.
    pub fn goto(&self, path: &str, replace: bool) {
        let origin = self.inner.driver.origin();
        if !path.starts_with('/') && !path.starts_with(&origin) {
            debug!(url = %path, "external target; full-page navigation");
            self.inner.driver.assign_external(path);
            return;
        }
        if path == self.current_path() {
            return;
        }

        let attempt = self.inner.goto_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let interceptors = self.interceptor_snapshot();
        if interceptors.is_empty() {
            self.commit_goto(path, replace);
            return;
        }

        let this = self.clone();
        let target = path.to_owned();
        (self.inner.spawner)(Box::pin(async move {
            let pending: Vec<_> = interceptors
                .iter()
                .map(|interceptor| interceptor(&target, replace))
                .collect();
            let results = join_all(pending).await;
            if results.iter().any(Result::is_err) {
                debug!(path = %target, "navigation vetoed by interceptor");
                return;
            }
            if this.inner.goto_seq.load(Ordering::Acquire) != attempt {
                debug!(path = %target, "navigation superseded; skipping");
                return;
            }
            if target == this.current_path() {
                return;
            }
            this.commit_goto(&target, replace);
        }));
    }

    /// Register an async interceptor consulted before navigations commit.
    ///
    /// The registration lives as long as the returned guard; attach it to
    /// an arena to scope it to a mounted subtree.
    #[must_use = "dropping the guard unregisters the interceptor"]
    pub fn before_goto(
        &self,
        callback: impl Fn(&str, bool) -> BoxFuture<'static, RouterResult<()>> + Send + Sync + 'static,
    ) -> InterceptorGuard {
        let id = self.inner.interceptor_seq.fetch_add(1, Ordering::AcqRel);
        lock(&self.inner.interceptors).push((id, Arc::new(callback)));
        InterceptorGuard {
            id,
            state: Arc::downgrade(&self.inner),
        }
    }

    /// Apply a back/forward navigation reported by the platform.
    ///
    /// Interceptors run first; any rejection vetoes the move, leaving the
    /// current path and scroll untouched.
    pub fn handle_pop(&self, incoming_index: u64, path: &str) {
        let interceptors = self.interceptor_snapshot();
        if interceptors.is_empty() {
            self.apply_navigation(incoming_index, path);
            return;
        }
        let this = self.clone();
        let target = path.to_owned();
        (self.inner.spawner)(Box::pin(async move {
            let pending: Vec<_> = interceptors
                .iter()
                .map(|interceptor| interceptor(&target, false))
                .collect();
            let results = join_all(pending).await;
            if results.iter().any(Result::is_err) {
                debug!(path = %target, "back/forward navigation vetoed");
                return;
            }
            this.apply_navigation(incoming_index, &target);
        }));
    }

    fn interceptor_snapshot(&self) -> Vec<InterceptorFn> {
        lock(&self.inner.interceptors)
            .iter()
            .map(|(_, interceptor)| interceptor.clone())
            .collect()
    }

    fn commit_goto(&self, path: &str, replace: bool) {
        let index = self.inner.next_index.fetch_add(1, Ordering::AcqRel);
        let action = if replace {
            HistoryAction::Replace
        } else {
            HistoryAction::Push
        };
        self.inner.driver.apply(action, index, path);
        self.apply_navigation(index, path);
    }

    fn apply_navigation(&self, incoming_index: u64, path: &str) {
        // Read-then-write: capture the outgoing position against the
        // outgoing index before the index advances.
        let outgoing = self.inner.current_index.load(Ordering::Acquire);
        self.inner
            .scroll
            .set(outgoing, self.inner.driver.scroll_position());

        self.inner.path.set(path.to_owned());

        let restored = self
            .inner
            .scroll
            .get(incoming_index)
            .unwrap_or_default();
        self.inner.driver.scroll_to(restored);
        self.inner
            .current_index
            .store(incoming_index, Ordering::Release);
        debug!(path, index = incoming_index, "navigation applied");
    }
}

impl std::fmt::Debug for NavigationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationController")
            .field("path", &self.current_path())
            .field("index", &self.history_index())
            .finish()
    }
}

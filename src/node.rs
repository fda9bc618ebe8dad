//! Opaque UI subtrees
//!
//! The engine never interprets UI content; it only decides which subtree
//! is active and when to switch. [`UiNode`] is the minimal representation
//! it shuffles around: pre-serialized markup, fragments, and async-filled
//! slots. On the server path a settled tree serializes to HTML; on the
//! client the host renderer consumes the adopted node however it likes.

use crate::arena::DisposalArena;
use crate::context::ClientApi;
use crate::error::RouterResult;
use crate::reactive::{Scheduler, lock};
use crate::router::Router;
use crate::staging::{AsyncBoundary, AsyncDependency};
use std::sync::{Arc, Mutex};

/// Lazy subtree producer attached to a route descriptor. Invoked inside the
/// staged root's build context; a returned error renders as the boundary's
/// fallback and never propagates past the router.
pub type ChildrenFn = Arc<dyn Fn(&BuildCx) -> RouterResult<UiNode> + Send + Sync>;

/// Wraps a route's output in surrounding layout markup.
pub type LayoutFn = Arc<dyn Fn(UiNode) -> UiNode + Send + Sync>;

/// An opaque UI subtree.
#[derive(Clone)]
pub enum UiNode {
    /// Nothing.
    Empty,
    /// Pre-serialized markup, emitted verbatim.
    Raw(String),
    /// Ordered children.
    Fragment(Vec<UiNode>),
    /// A slot filled once an async dependency resolves.
    Slot(AsyncSlot),
    /// Resolved at read time. Nested routers embed their live output this
    /// way, so a parent's staged tree follows inner navigation without a
    /// rebuild.
    Dynamic(DynNode),
}

/// Late-bound node producer, resolved on every read.
#[derive(Clone)]
pub struct DynNode(Arc<dyn Fn() -> UiNode + Send + Sync>);

impl DynNode {
    pub fn new(producer: impl Fn() -> UiNode + Send + Sync + 'static) -> Self {
        Self(Arc::new(producer))
    }

    pub fn resolve(&self) -> UiNode {
        (self.0)()
    }
}

impl UiNode {
    /// Markup emitted verbatim.
    pub fn raw(markup: impl Into<String>) -> Self {
        Self::Raw(markup.into())
    }

    /// Text content, HTML-escaped.
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::Raw(escape_html(text.as_ref()))
    }

    /// Serialize a settled tree. Unfilled slots serialize to nothing; the
    /// server renderer only serializes after the boundary settled, so a
    /// hole here means the subtree was deliberately abandoned.
    pub fn to_html(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Raw(markup) => markup.clone(),
            Self::Fragment(children) => children.iter().map(UiNode::to_html).collect(),
            Self::Slot(slot) => slot.get().map(|node| node.to_html()).unwrap_or_default(),
            Self::Dynamic(producer) => producer.resolve().to_html(),
        }
    }

    /// True if serializing would emit nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(markup) => markup.is_empty(),
            Self::Fragment(children) => children.iter().all(UiNode::is_empty),
            Self::Slot(slot) => slot.get().map(|node| node.is_empty()).unwrap_or(true),
            Self::Dynamic(producer) => producer.resolve().is_empty(),
        }
    }
}

impl std::fmt::Debug for UiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Raw(markup) => f.debug_tuple("Raw").field(markup).finish(),
            Self::Fragment(children) => f.debug_tuple("Fragment").field(&children.len()).finish(),
            Self::Slot(slot) => f
                .debug_tuple("Slot")
                .field(&slot.get().is_some())
                .finish(),
            Self::Dynamic(_) => write!(f, "Dynamic"),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// A node position filled in later by async work.
#[derive(Clone)]
pub struct AsyncSlot {
    content: Arc<Mutex<Option<UiNode>>>,
}

impl AsyncSlot {
    fn new() -> Self {
        Self {
            content: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get(&self) -> Option<UiNode> {
        lock(&self.content).clone()
    }
}

/// Write half of an [`AsyncSlot`]: fill it and resolve the boundary
/// dependency it was registered under. Dropping without filling still
/// resolves the dependency, so an abandoned fetch cannot wedge readiness.
pub struct SlotWriter {
    content: Arc<Mutex<Option<UiNode>>>,
    dependency: AsyncDependency,
}

impl SlotWriter {
    /// Fill the slot and mark the dependency resolved.
    pub fn fill(self, node: UiNode) {
        *lock(&self.content) = Some(node);
        self.dependency.resolve();
    }
}

impl Drop for SlotWriter {
    fn drop(&mut self) {
        self.dependency.resolve();
    }
}

/// Head metadata accumulated while subtrees build, emitted into the
/// document head by the server renderer.
#[derive(Clone, Default)]
pub struct HeadCollector {
    inner: Arc<Mutex<HeadContent>>,
}

#[derive(Default)]
struct HeadContent {
    title: Option<String>,
    fragments: Vec<String>,
}

impl HeadCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document title. Last writer wins, matching render order.
    pub fn set_title(&self, title: impl Into<String>) {
        lock(&self.inner).title = Some(title.into());
    }

    /// Append a raw head fragment (a `<meta>` or `<link>` tag).
    pub fn push(&self, fragment: impl Into<String>) {
        lock(&self.inner).fragments.push(fragment.into());
    }

    /// Serialize the collected head content.
    pub fn to_html(&self) -> String {
        let content = lock(&self.inner);
        let mut html = String::new();
        if let Some(title) = &content.title {
            html.push_str("<title>");
            html.push_str(&escape_html(title));
            html.push_str("</title>");
        }
        for fragment in &content.fragments {
            html.push_str(fragment);
        }
        html
    }
}

/// Build context threaded into every subtree producer.
///
/// Carries the staged root's arena and async boundary, the shared head
/// collector, and the client API. Everything a subtree needs arrives here
/// explicitly; there is no ambient lookup.
pub struct BuildCx {
    arena: DisposalArena,
    boundary: AsyncBoundary,
    head: HeadCollector,
    api: Arc<ClientApi>,
    scheduler: Arc<Scheduler>,
    routers: Arc<Mutex<Vec<Arc<Router>>>>,
}

impl BuildCx {
    pub(crate) fn new(
        arena: DisposalArena,
        boundary: AsyncBoundary,
        head: HeadCollector,
        api: Arc<ClientApi>,
        scheduler: Arc<Scheduler>,
        routers: Arc<Mutex<Vec<Arc<Router>>>>,
    ) -> Self {
        Self {
            arena,
            boundary,
            head,
            api,
            scheduler,
            routers,
        }
    }

    /// The staged root's disposal arena.
    pub fn arena(&self) -> &DisposalArena {
        &self.arena
    }

    /// Shared head metadata collector.
    pub fn head(&self) -> &HeadCollector {
        &self.head
    }

    /// The cross-cutting client API.
    pub fn api(&self) -> &Arc<ClientApi> {
        &self.api
    }

    /// The scheduler driving this router tree.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Register a cleanup on the staged root's arena.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.arena.on_cleanup(cleanup);
    }

    /// Mount a nested router under this staged root. The owning router
    /// drives the nested one's passes while this root stays adopted.
    pub(crate) fn mount_router(&self, router: Arc<Router>) {
        lock(&self.routers).push(router);
    }

    /// Open an async slot under this root's boundary. The boundary (and so
    /// the root's readiness) waits until the writer fills, or drops.
    pub fn async_slot(&self) -> (UiNode, SlotWriter) {
        let slot = AsyncSlot::new();
        let writer = SlotWriter {
            content: slot.content.clone(),
            dependency: self.boundary.register(),
        };
        (UiNode::Slot(slot), writer)
    }
}

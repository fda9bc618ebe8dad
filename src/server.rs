//! Server rendering
//!
//! [`render_to_document`] runs the router against one request until the
//! tree is quiescent (every gate settled, every staged boundary resolved)
//! and then emits a full HTML document: collected head metadata, a hydration
//! bootstrap carrying the initial navigation state, and the serialized
//! adopted subtree. When no top-level route matches it reports
//! fall-through so the host HTTP layer can run its own not-found handling.
//!
//! [`server_middleware`] adapts the renderer to a `(request, response,
//! next)` shape for installation into the host's request pipeline.

use crate::context::ClientApi;
use crate::error::RouterResult;
use crate::http::{ResponseHandle, ServerRequest};
use crate::node::HeadCollector;
use crate::plugin::{AppPlugin, route_providers};
use crate::reactive::Scheduler;
use crate::router::Router;
use crate::staging::BuildEnv;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, error};

/// How one server render concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A document was rendered and sent.
    Completed,
    /// No route matched; the caller should fall through to its next
    /// handler.
    FellThrough,
    /// The response was already produced (typically by a gate middleware);
    /// nothing was sent.
    AlreadySent,
}

/// Document shell configuration.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// `lang` attribute on the `<html>` element.
    pub lang: String,
    /// `id` of the mount element wrapping the serialized UI.
    pub mount_id: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_owned(),
            mount_id: "staged-router-root".to_owned(),
        }
    }
}

impl DocumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "This method returns a new DocumentOptions and does not modify self"]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    #[must_use = "This method returns a new DocumentOptions and does not modify self"]
    pub fn with_mount_id(mut self, mount_id: impl Into<String>) -> Self {
        self.mount_id = mount_id.into();
        self
    }
}

/// Render one request to a complete HTML document.
///
/// Requires both HTTP handles; missing context is a configuration error.
/// A subtree that fails to build renders as its boundary fallback; the
/// document is still emitted best-effort.
pub async fn render_to_document(
    request: Arc<dyn ServerRequest>,
    response: Arc<dyn ResponseHandle>,
    plugins: Vec<Arc<dyn AppPlugin>>,
    options: DocumentOptions,
) -> RouterResult<RenderOutcome> {
    let scheduler = Scheduler::new();
    let api = ClientApi::server(
        scheduler.clone(),
        Some(request.clone()),
        Some(response.clone()),
        plugins.clone(),
    )?;
    let head = HeadCollector::new();
    let env = BuildEnv {
        scheduler: scheduler.clone(),
        api,
        head: head.clone(),
    };
    let children = route_providers(&plugins, &env);
    let router = Router::new(env).with_children(children);

    scheduler.request_pass();
    run_to_quiescence(&scheduler, &router).await;

    if response.headers_sent() {
        debug!("response already produced during render");
        router.teardown();
        return Ok(RenderOutcome::AlreadySent);
    }
    if !router.matched() {
        debug!(url = %request.original_url(), "no route matched; falling through");
        router.teardown();
        return Ok(RenderOutcome::FellThrough);
    }

    let body = router.output().to_html();
    let bootstrap = bootstrap_script(request.original_url());
    let document = format!(
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n  <head>\n    <meta charset=\"UTF-8\">\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    {head}\n    {bootstrap}\n  </head>\n  <body>\n    <div id=\"{mount_id}\">{body}</div>\n  </body>\n</html>",
        lang = options.lang,
        head = head.to_html(),
        bootstrap = bootstrap,
        mount_id = options.mount_id,
        body = body,
    );
    router.teardown();
    response.send(document)?;
    Ok(RenderOutcome::Completed)
}

/// Alternate passes and ticks until the scheduler is locally idle, then
/// wait for outstanding external work (pending gates, unresolved async
/// dependencies) before concluding.
async fn run_to_quiescence(scheduler: &Arc<Scheduler>, router: &Router) {
    loop {
        let mut advanced = false;
        if scheduler.take_pass_request() {
            router.pass();
            advanced = true;
        }
        if scheduler.tick() > 0 {
            advanced = true;
        }
        if advanced || scheduler.has_local_work() {
            continue;
        }
        if scheduler.external_pending() == 0 {
            break;
        }
        scheduler.work_available().await;
    }
}

fn bootstrap_script(path: &str) -> String {
    let state = serde_json::json!({
        "path": path,
        "historyIndex": 0,
    });
    // "</" must not appear inside an inline script.
    let payload = state.to_string().replace("</", "<\\/");
    format!(
        "<script>window.__STAGED_ROUTER_STATE__ = {};</script>",
        payload
    )
}

/// Called when a render falls through so the host layer takes over.
pub type NextFn = Box<dyn FnOnce() + Send>;

/// Adapt the renderer to a `(request, response, next)` middleware for the
/// host HTTP layer. Render failures log and fall through rather than
/// taking the request down.
pub fn server_middleware(
    plugins: Vec<Arc<dyn AppPlugin>>,
    options: DocumentOptions,
) -> impl Fn(Arc<dyn ServerRequest>, Arc<dyn ResponseHandle>, NextFn) -> BoxFuture<'static, ()>
{
    move |request, response, next| {
        let plugins = plugins.clone();
        let options = options.clone();
        Box::pin(async move {
            match render_to_document(request, response, plugins, options).await {
                Ok(RenderOutcome::Completed) | Ok(RenderOutcome::AlreadySent) => {}
                Ok(RenderOutcome::FellThrough) => next(),
                Err(err) => {
                    error!(error = ?err, "server render failed");
                    next();
                }
            }
        })
    }
}

//! Cross-cutting client API
//!
//! [`ClientApi`] is the one surface subtrees use to reach navigation and,
//! during server rendering, the request/response pair. It is threaded
//! explicitly through construction and the build context, never looked up
//! ambiently.
//!
//! The same type serves both environments: the client constructor wires a
//! history driver into a [`NavigationController`]; the server constructor
//! wires the request/response handles and stubs navigation out.

use crate::adoption::RenderMode;
use crate::error::{RouterError, RouterResult};
use crate::http::{ResponseHandle, ServerRequest};
use crate::navigation::{
    HistoryDriver, InterceptorGuard, NavigationController, ScrollPosition, SessionStorage,
    Spawner, StorageArea,
};
use crate::plugin::AppPlugin;
use crate::reactive::Scheduler;
use futures::future::BoxFuture;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Request/response pair available during server rendering.
pub struct SsrHandles {
    pub request: Arc<dyn ServerRequest>,
    pub response: Arc<dyn ResponseHandle>,
}

/// The application-facing API: navigation surface, plugin list, and (on
/// the server) the HTTP handles.
pub struct ClientApi {
    mode: RenderMode,
    scheduler: Arc<Scheduler>,
    navigation: Option<NavigationController>,
    ssr: Option<SsrHandles>,
    plugins: Vec<Arc<dyn AppPlugin>>,
}

impl ClientApi {
    /// Build the client-side API with session-scoped scroll storage.
    pub fn client(
        scheduler: Arc<Scheduler>,
        driver: Arc<dyn HistoryDriver>,
        spawner: Spawner,
        plugins: Vec<Arc<dyn AppPlugin>>,
    ) -> Arc<Self> {
        Self::client_with_storage(scheduler, driver, Arc::new(SessionStorage::new()), spawner, plugins)
    }

    /// Build the client-side API over an explicit storage area.
    pub fn client_with_storage(
        scheduler: Arc<Scheduler>,
        driver: Arc<dyn HistoryDriver>,
        storage: Arc<dyn StorageArea>,
        spawner: Spawner,
        plugins: Vec<Arc<dyn AppPlugin>>,
    ) -> Arc<Self> {
        let navigation =
            NavigationController::new(scheduler.clone(), driver, storage, spawner);
        Arc::new(Self {
            mode: RenderMode::Client,
            scheduler,
            navigation: Some(navigation),
            ssr: None,
            plugins,
        })
    }

    /// Build the server-side API. Both handles are required; rendering on
    /// the server without them is a configuration error.
    pub fn server(
        scheduler: Arc<Scheduler>,
        request: Option<Arc<dyn ServerRequest>>,
        response: Option<Arc<dyn ResponseHandle>>,
        plugins: Vec<Arc<dyn AppPlugin>>,
    ) -> RouterResult<Arc<Self>> {
        let (Some(request), Some(response)) = (request, response) else {
            return Err(RouterError::configuration(
                "server rendering requires a request and a response",
            ));
        };
        Ok(Arc::new(Self {
            mode: RenderMode::Server,
            scheduler,
            navigation: None,
            ssr: Some(SsrHandles { request, response }),
            plugins,
        }))
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The navigation controller, on the client.
    pub fn navigation(&self) -> Option<&NavigationController> {
        self.navigation.as_ref()
    }

    /// The request/response pair, on the server.
    pub fn ssr(&self) -> Option<&SsrHandles> {
        self.ssr.as_ref()
    }

    pub fn plugins(&self) -> &[Arc<dyn AppPlugin>] {
        &self.plugins
    }

    /// Current path + query + fragment.
    pub fn current_path(&self) -> String {
        match (&self.navigation, &self.ssr) {
            (Some(navigation), _) => navigation.current_path(),
            (None, Some(ssr)) => ssr.request.original_url().to_owned(),
            (None, None) => "/".to_owned(),
        }
    }

    /// Absolute URL of the current location, when the origin is known.
    pub fn url(&self) -> String {
        match (&self.navigation, &self.ssr) {
            (Some(navigation), _) => navigation.url(),
            (None, Some(ssr)) => match ssr.request.origin() {
                Some(origin) => format!("{}{}", origin, ssr.request.original_url()),
                None => ssr.request.original_url().to_owned(),
            },
            (None, None) => "/".to_owned(),
        }
    }

    /// Navigate. No-op during server rendering.
    pub fn goto(&self, path: &str, replace: bool) {
        match &self.navigation {
            Some(navigation) => navigation.goto(path, replace),
            None => debug!(path, "goto ignored during server render"),
        }
    }

    /// Register a navigation interceptor. `None` during server rendering,
    /// where navigation never commits.
    pub fn before_goto(
        &self,
        callback: impl Fn(&str, bool) -> BoxFuture<'static, RouterResult<()>> + Send + Sync + 'static,
    ) -> Option<InterceptorGuard> {
        self.navigation
            .as_ref()
            .map(|navigation| navigation.before_goto(callback))
    }

    pub fn history_index(&self) -> u64 {
        self.navigation
            .as_ref()
            .map(NavigationController::history_index)
            .unwrap_or(0)
    }

    pub fn scroll_entry(&self) -> ScrollPosition {
        self.navigation
            .as_ref()
            .map(NavigationController::scroll_entry)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ClientApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientApi")
            .field("mode", &self.mode)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

/// A server-side fetch, prepared but not executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFetch {
    /// Absolute URL to request.
    pub url: String,
    /// Cookie header to forward, when the target is same-site with the
    /// incoming request.
    pub forward_cookie: Option<String>,
}

fn absolute_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://").expect("hard-coded pattern compiles"))
}

/// Prepare a URL for server-side data fetching.
///
/// Relative URLs are made absolute against the incoming request's
/// protocol and host. The incoming Cookie header is forwarded only when
/// the target hostname is same-site with the incoming request. No I/O
/// happens here; the host's HTTP client executes the result.
pub fn prepare_ssr_fetch(request: &dyn ServerRequest, url: &str) -> PreparedFetch {
    let host = request
        .host()
        .map(|host| host.trim_end_matches('/').to_owned());

    let absolute = if !absolute_url_pattern().is_match(url) {
        match &host {
            Some(host) => {
                let path = if url.starts_with('/') {
                    url.to_owned()
                } else {
                    format!("/{}", url)
                };
                format!("{}://{}{}", request.protocol(), host, path)
            }
            None => url.to_owned(),
        }
    } else {
        url.to_owned()
    };

    let forward_cookie = match (target_host(&absolute), request.hostname()) {
        (Some(target), Some(own)) if is_same_site(&target, &own) => request.cookies(),
        _ => None,
    };

    PreparedFetch {
        url: absolute,
        forward_cookie,
    }
}

fn target_host(url: &str) -> Option<String> {
    url.parse::<http::Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_owned))
}

/// Same-site: the target hostname equals the request hostname or is a
/// subdomain of it.
fn is_same_site(target: &str, own: &str) -> bool {
    format!(".{}", target).ends_with(&format!(".{}", own))
}

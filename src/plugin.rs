//! Application plugins and client bootstrap
//!
//! Applications contribute route trees through [`AppPlugin`]. The render
//! entrypoints filter the plugin list down to route providers, in
//! declaration order, and hand each one the environment it needs to build
//! its tree; nothing is discovered by traversal.

use crate::context::ClientApi;
use crate::navigation::{HistoryDriver, SessionStorage, Spawner, StorageArea};
use crate::node::HeadCollector;
use crate::reactive::Scheduler;
use crate::route::RouterChild;
use crate::router::Router;
use crate::staging::BuildEnv;
use std::sync::Arc;

/// A named application plugin. Plugins that provide routes return a tree
/// from [`routes`](AppPlugin::routes); the rest leave the default.
pub trait AppPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// The route tree this plugin contributes, if any.
    fn routes(&self, env: &BuildEnv) -> Option<RouterChild> {
        let _ = env;
        None
    }
}

/// Collect the route trees of every route-providing plugin, in order.
pub fn route_providers(plugins: &[Arc<dyn AppPlugin>], env: &BuildEnv) -> Vec<RouterChild> {
    plugins.iter().filter_map(|plugin| plugin.routes(env)).collect()
}

/// Function-backed route provider, for apps that don't need a custom
/// plugin type.
///
/// # Example
/// ```rust,ignore
/// let app = RoutesPlugin::new("shop", |env| {
///     nested_routes(env, vec![/* ... */])
/// });
/// ```
pub struct RoutesPlugin {
    name: String,
    builder: Arc<dyn Fn(&BuildEnv) -> RouterChild + Send + Sync>,
}

impl RoutesPlugin {
    pub fn new(
        name: impl Into<String>,
        builder: impl Fn(&BuildEnv) -> RouterChild + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            builder: Arc::new(builder),
        })
    }
}

impl AppPlugin for RoutesPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn routes(&self, env: &BuildEnv) -> Option<RouterChild> {
        Some((self.builder)(env))
    }
}

/// A bootstrapped client: scheduler, API, and root router wired together.
pub struct ClientRuntime {
    pub scheduler: Arc<Scheduler>,
    pub api: Arc<ClientApi>,
    pub router: Arc<Router>,
}

impl ClientRuntime {
    /// Drain all pending work: alternate passes and ticks until the
    /// scheduler is locally idle. External work (in-flight interceptors,
    /// unresolved async slots) is not waited for; the next mutation
    /// requests another pass.
    pub fn pump(&self) {
        loop {
            let mut advanced = false;
            if self.scheduler.take_pass_request() {
                self.router.pass();
                advanced = true;
            }
            if self.scheduler.tick() > 0 {
                advanced = true;
            }
            if !advanced && !self.scheduler.has_local_work() {
                break;
            }
        }
    }
}

/// Wire up the client side: navigation over `driver`, the plugin route
/// trees, and a root router, with session-scoped scroll storage.
pub fn bootstrap_client(
    driver: Arc<dyn HistoryDriver>,
    spawner: Spawner,
    plugins: Vec<Arc<dyn AppPlugin>>,
) -> ClientRuntime {
    bootstrap_client_with_storage(driver, Arc::new(SessionStorage::new()), spawner, plugins)
}

/// [`bootstrap_client`] with an explicit storage area.
pub fn bootstrap_client_with_storage(
    driver: Arc<dyn HistoryDriver>,
    storage: Arc<dyn StorageArea>,
    spawner: Spawner,
    plugins: Vec<Arc<dyn AppPlugin>>,
) -> ClientRuntime {
    let scheduler = Scheduler::new();
    let api = ClientApi::client_with_storage(
        scheduler.clone(),
        driver,
        storage,
        spawner,
        plugins.clone(),
    );
    let env = BuildEnv {
        scheduler: scheduler.clone(),
        api: api.clone(),
        head: HeadCollector::new(),
    };
    let children = route_providers(&plugins, &env);
    let router = Arc::new(Router::new(env).with_children(children));
    scheduler.request_pass();
    ClientRuntime {
        scheduler,
        api,
        router,
    }
}

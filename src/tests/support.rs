//! Shared test fixtures

use crate::context::ClientApi;
use crate::http::{BufferedResponse, RequestParts};
use crate::navigation::{MemoryHistory, SessionStorage, Spawner};
use crate::node::HeadCollector;
use crate::reactive::Scheduler;
use crate::router::Router;
use crate::staging::BuildEnv;
use std::sync::Arc;

/// A spawner that runs the handed-off future to completion inline.
/// Deterministic for tests whose interceptors are already ready.
pub fn inline_spawner() -> Spawner {
    Arc::new(|future| futures::executor::block_on(future))
}

/// Client-mode fixture: scheduler, API over an in-memory history, and a
/// build environment.
pub struct ClientFixture {
    pub scheduler: Arc<Scheduler>,
    pub api: Arc<ClientApi>,
    pub env: BuildEnv,
    pub driver: Arc<MemoryHistory>,
}

pub fn client_fixture() -> ClientFixture {
    client_fixture_at("/")
}

pub fn client_fixture_at(initial_path: &str) -> ClientFixture {
    let scheduler = Scheduler::new();
    let driver = Arc::new(MemoryHistory::new("http://localhost", initial_path));
    let api = ClientApi::client_with_storage(
        scheduler.clone(),
        driver.clone(),
        Arc::new(SessionStorage::new()),
        inline_spawner(),
        Vec::new(),
    );
    let env = BuildEnv {
        scheduler: scheduler.clone(),
        api: api.clone(),
        head: HeadCollector::new(),
    };
    ClientFixture {
        scheduler,
        api,
        env,
        driver,
    }
}

/// Server-mode fixture over a buffered request/response pair.
pub struct ServerFixture {
    pub scheduler: Arc<Scheduler>,
    pub api: Arc<ClientApi>,
    pub env: BuildEnv,
    pub request: Arc<RequestParts>,
    pub response: Arc<BufferedResponse>,
}

pub fn server_fixture(url: &str) -> ServerFixture {
    let scheduler = Scheduler::new();
    let request = Arc::new(RequestParts::get(url).with_host("app.example"));
    let response = Arc::new(BufferedResponse::new());
    let api = ClientApi::server(
        scheduler.clone(),
        Some(request.clone()),
        Some(response.clone()),
        Vec::new(),
    )
    .expect("both handles provided");
    let env = BuildEnv {
        scheduler: scheduler.clone(),
        api: api.clone(),
        head: HeadCollector::new(),
    };
    ServerFixture {
        scheduler,
        api,
        env,
        request,
        response,
    }
}

/// Alternate passes and ticks until the scheduler is locally idle.
pub fn pump(scheduler: &Arc<Scheduler>, router: &Router) {
    loop {
        let mut advanced = false;
        if scheduler.take_pass_request() {
            router.pass();
            advanced = true;
        }
        if scheduler.tick() > 0 {
            advanced = true;
        }
        if !advanced && !scheduler.has_local_work() {
            break;
        }
    }
}

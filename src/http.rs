//! Request/response handles
//!
//! The router is not an HTTP server. During server rendering it consumes a
//! request and a response owned by an external HTTP layer, through the two
//! traits here. [`RequestParts`] and [`BufferedResponse`] are the concrete
//! implementations the server renderer and the tests use; a host can adapt
//! its own connection types instead.

use crate::error::{RouterError, RouterResult};
use crate::reactive::lock;
use http::header::{COOKIE, HOST, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use std::sync::{Arc, Mutex};

/// Why a response stopped accepting output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The response body was written out completely.
    Finish,
    /// The connection closed before the body completed.
    Close,
    /// The response stream errored.
    Error,
}

/// Read-only view of the incoming request.
pub trait ServerRequest: Send + Sync {
    fn method(&self) -> &Method;

    /// Path plus query, as received.
    fn original_url(&self) -> &str;

    /// `"http"` or `"https"`.
    fn protocol(&self) -> &str;

    fn headers(&self) -> &HeaderMap;

    /// The Host header, verbatim (may carry a port).
    fn host(&self) -> Option<String> {
        self.headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    /// Host without the port.
    fn hostname(&self) -> Option<String> {
        self.host()
            .map(|host| host.split(':').next().unwrap_or(&host).to_owned())
    }

    /// The Cookie header, verbatim.
    fn cookies(&self) -> Option<String> {
        self.headers()
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }

    /// `protocol://host`, when the Host header is present.
    fn origin(&self) -> Option<String> {
        self.host()
            .map(|host| format!("{}://{}", self.protocol(), host))
    }
}

/// Owned request data, buildable from any HTTP layer's types.
#[derive(Debug, Clone)]
pub struct RequestParts {
    method: Method,
    original_url: String,
    protocol: String,
    headers: HeaderMap,
}

impl RequestParts {
    pub fn new(method: Method, original_url: impl Into<String>) -> Self {
        Self {
            method,
            original_url: original_url.into(),
            protocol: "http".to_owned(),
            headers: HeaderMap::new(),
        }
    }

    /// Shorthand for a plain GET.
    pub fn get(original_url: impl Into<String>) -> Self {
        Self::new(Method::GET, original_url)
    }

    #[must_use = "This method returns a new RequestParts and does not modify self"]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Append a header. Values that are not valid header text are dropped.
    #[must_use = "This method returns a new RequestParts and does not modify self"]
    pub fn with_header(mut self, name: HeaderName, value: impl AsRef<str>) -> Self {
        if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use = "This method returns a new RequestParts and does not modify self"]
    pub fn with_host(self, host: impl AsRef<str>) -> Self {
        self.with_header(HOST, host)
    }

    #[must_use = "This method returns a new RequestParts and does not modify self"]
    pub fn with_cookie(self, cookie: impl AsRef<str>) -> Self {
        self.with_header(COOKIE, cookie)
    }
}

impl ServerRequest for RequestParts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn original_url(&self) -> &str {
        &self.original_url
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// One-shot subscriber to the end of a response.
pub type EndCallback = Box<dyn FnOnce(EndReason) + Send>;

/// Write half of the response, as the router sees it.
pub trait ResponseHandle: Send + Sync {
    /// Whether response headers already went out.
    fn headers_sent(&self) -> bool;

    /// Whether the body stream ended (completed, closed, or errored).
    fn body_ended(&self) -> bool;

    /// Subscribe to the end of the response. Fires at most once; if the
    /// response already ended, fires immediately.
    fn on_end(&self, callback: EndCallback);

    /// Send a complete body. Fails with `RESPONSE_CLOSED` after the
    /// response ended.
    fn send(&self, body: String) -> RouterResult<()>;
}

/// In-memory response used by the server renderer and tests.
#[derive(Clone, Default)]
pub struct BufferedResponse {
    inner: Arc<Mutex<ResponseState>>,
}

#[derive(Default)]
struct ResponseState {
    headers_sent: bool,
    end_reason: Option<EndReason>,
    body: Option<String>,
    subscribers: Vec<EndCallback>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The body passed to `send`, if any.
    pub fn sent_body(&self) -> Option<String> {
        lock(&self.inner).body.clone()
    }

    /// Simulate the external layer completing the response (e.g. a gate
    /// middleware wrote and ended it directly).
    pub fn finish(&self) {
        self.end(EndReason::Finish, true);
    }

    /// Simulate the connection closing early.
    pub fn close(&self) {
        self.end(EndReason::Close, false);
    }

    /// Simulate a response stream error.
    pub fn error(&self) {
        self.end(EndReason::Error, false);
    }

    fn end(&self, reason: EndReason, headers_sent: bool) {
        let subscribers = {
            let mut state = lock(&self.inner);
            if state.end_reason.is_some() {
                return;
            }
            state.end_reason = Some(reason);
            if headers_sent {
                state.headers_sent = true;
            }
            std::mem::take(&mut state.subscribers)
        };
        // Callbacks run outside the lock: a subscriber may read the
        // response state re-entrantly.
        for callback in subscribers {
            callback(reason);
        }
    }
}

impl ResponseHandle for BufferedResponse {
    fn headers_sent(&self) -> bool {
        lock(&self.inner).headers_sent
    }

    fn body_ended(&self) -> bool {
        lock(&self.inner).end_reason.is_some()
    }

    fn on_end(&self, callback: EndCallback) {
        let fire_now = {
            let mut state = lock(&self.inner);
            match state.end_reason {
                Some(reason) => Some(reason),
                None => {
                    state.subscribers.push(callback);
                    return;
                }
            }
        };
        if let Some(reason) = fire_now {
            callback(reason);
        }
    }

    fn send(&self, body: String) -> RouterResult<()> {
        let subscribers = {
            let mut state = lock(&self.inner);
            if state.end_reason.is_some() {
                return Err(RouterError::response_closed(
                    "send after the response ended",
                ));
            }
            state.headers_sent = true;
            state.end_reason = Some(EndReason::Finish);
            state.body = Some(body);
            std::mem::take(&mut state.subscribers)
        };
        for callback in subscribers {
            callback(EndReason::Finish);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BufferedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("BufferedResponse")
            .field("headers_sent", &state.headers_sent)
            .field("end_reason", &state.end_reason)
            .field("has_body", &state.body.is_some())
            .finish()
    }
}

//! Error types for router operations
//!
//! This module provides type-safe error handling for the router engine.
//!
//! # Error Codes
//!
//! Error codes are represented by the [`RouterErrorCode`] enum. When
//! serialized, codes are converted to SCREAMING_SNAKE_CASE strings.
//!
//! # Example
//! ```rust,ignore
//! use staged_router::{RouterError, RouterErrorCode};
//!
//! let error = RouterError::new(RouterErrorCode::Configuration, "server render requires a request");
//! let error = RouterError::configuration("server render requires a request"); // Convenience method
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Type-safe error codes for router operations.
///
/// Each code maps to one failure class of the engine. When serialized to
/// JSON, codes are converted to SCREAMING_SNAKE_CASE (e.g. `SubtreeRender`
/// becomes `"SUBTREE_RENDER"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouterErrorCode {
    /// Required context was missing at setup (e.g. server render without a
    /// request/response pair). Fatal for the operation being set up.
    Configuration,
    /// A `before_goto` interceptor rejected an in-flight navigation. The
    /// navigation is skipped silently; this code never reaches callers of
    /// `goto` and exists so interceptors have a typed rejection value.
    NavigationVeto,
    /// A route's subtree producer failed. Caught at the nearest enclosing
    /// boundary and rendered as its fallback.
    SubtreeRender,
    /// A gate middleware failed synchronously. Treated as not-proceeded.
    Middleware,
    /// A write was attempted on a response that already ended.
    ResponseClosed,
}

impl RouterErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::NavigationVeto => "NAVIGATION_VETO",
            Self::SubtreeRender => "SUBTREE_RENDER",
            Self::Middleware => "MIDDLEWARE",
            Self::ResponseClosed => "RESPONSE_CLOSED",
        }
    }

    /// Returns true if this error aborts only the in-flight operation and
    /// must never propagate past the router.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Self::NavigationVeto | Self::SubtreeRender | Self::Middleware
        )
    }
}

impl fmt::Display for RouterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Router error with type-safe code and message.
///
/// # Example
/// ```rust,ignore
/// use staged_router::{RouterError, RouterErrorCode};
///
/// let error = RouterError::new(RouterErrorCode::Middleware, "auth middleware failed");
/// let error = error.with_cause("upstream returned 502");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RouterError {
    /// Type-safe error code
    pub code: RouterErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional cause for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl RouterError {
    /// Create a new error with code and message.
    pub fn new(code: RouterErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Add a cause string for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    // Convenience constructors

    /// Create a CONFIGURATION error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(RouterErrorCode::Configuration, message)
    }

    /// Create a NAVIGATION_VETO error.
    pub fn veto(message: impl Into<String>) -> Self {
        Self::new(RouterErrorCode::NavigationVeto, message)
    }

    /// Create a SUBTREE_RENDER error.
    pub fn subtree_render(message: impl Into<String>) -> Self {
        Self::new(RouterErrorCode::SubtreeRender, message)
    }

    /// Create a MIDDLEWARE error.
    pub fn middleware(message: impl Into<String>) -> Self {
        Self::new(RouterErrorCode::Middleware, message)
    }

    /// Create a RESPONSE_CLOSED error.
    pub fn response_closed(message: impl Into<String>) -> Self {
        Self::new(RouterErrorCode::ResponseClosed, message)
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        Self::subtree_render(format!("JSON error: {}", err))
    }
}

/// Result type alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

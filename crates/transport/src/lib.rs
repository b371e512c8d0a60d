//! HTTP transport abstraction for the billing API client
//!
//! Defines the single-exchange `Transport` trait and the immutable request and
//! response values that flow through it. The transport knows nothing about
//! authentication: credentials are attached by `RequestStage`s composed into a
//! `Pipeline` before a request reaches `Transport::send`.
//!
//! Request flow:
//! 1. Caller builds an `ApiRequest` (method, path, headers, body)
//! 2. `Pipeline::apply` runs each stage in order (default headers, bearer token)
//! 3. `Transport::send` performs exactly one HTTP exchange with a timeout
//! 4. The caller classifies the `ApiResponse` or `TransportError`

pub mod headers;
pub mod http;
pub mod pipeline;
pub mod request;
pub mod response;

pub use headers::{DefaultHeaders, HeaderInjection};
pub use http::HttpTransport;
pub use pipeline::{Pipeline, RequestStage};
pub use request::ApiRequest;
pub use response::ApiResponse;

pub use reqwest::Method;
pub use reqwest::StatusCode;
pub use reqwest::header;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future used at dyn-compatible trait seams (`Arc<dyn Transport>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failures where no HTTP response was obtained.
///
/// Every variant classifies as a network error upstream: the session is never
/// touched because of one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure was the per-call timeout firing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Performs a single HTTP exchange for a fully-formed request.
///
/// Implementations must not retry, must not inspect or add credentials, and
/// must report a missing response (refused connection, timeout, reset) as a
/// `TransportError` rather than a synthetic status code.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ApiResponse>>;
}

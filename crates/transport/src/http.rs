//! reqwest-backed transport
//!
//! Joins the request path onto the configured base URL, applies the per-call
//! timeout and buffers the whole response body. Absolute URLs are only
//! accepted for the base URL's own origin, so request headers (credentials
//! included) never reach another host. Errors where no status line
//! was received are mapped onto `TransportError`; every HTTP status (including
//! 401 and 5xx) is returned as a normal `ApiResponse`.

use std::time::Duration;

use reqwest::Url;
use tracing::{debug, warn};

use crate::{ApiRequest, ApiResponse, BoxFuture, Result, Transport, TransportError};

/// HTTP transport over a shared `reqwest::Client`.
///
/// Clone is cheap: `reqwest::Client` keeps its connection pool behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` (e.g. `https://billing.example.com`).
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path.
    ///
    /// Absolute paths are used verbatim when they share the base URL's
    /// origin and rejected otherwise.
    pub fn url_for(&self, path: &str) -> Result<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            let target = Url::parse(path)
                .map_err(|e| TransportError::InvalidRequest(format!("invalid URL {path}: {e}")))?;
            let base = Url::parse(&self.base_url).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid base URL {}: {e}", self.base_url))
            })?;
            if target.origin() != base.origin() {
                warn!(target = %target.origin().ascii_serialization(), "refusing request to foreign origin");
                return Err(TransportError::InvalidRequest(format!(
                    "{} is outside {}",
                    target.origin().ascii_serialization(),
                    base.origin().ascii_serialization()
                )));
            }
            return Ok(path.to_string());
        }
        if path.starts_with('/') {
            Ok(format!("{}{}", self.base_url, path))
        } else {
            Ok(format!("{}/{}", self.base_url, path))
        }
    }

    async fn execute(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse> {
        let url = self.url_for(request.path())?;

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        debug!(
            method = %request.method(),
            path = request.path(),
            status = status.as_u16(),
            bytes = body.len(),
            "transport exchange complete"
        );
        Ok(ApiResponse::new(status, headers, body))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(self.execute(request, timeout))
    }
}

fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        warn!(error = %error, "connection failed");
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        warn!(error = %error, "transport failure");
        TransportError::Other(error.to_string())
    }
}

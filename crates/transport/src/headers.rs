//! Static header stage
//!
//! Fills in headers every API call should carry (JSON content negotiation,
//! client identification) without overriding what the caller already set.
//! The Authorization header is reserved for the bearer stage and is never
//! injected from static configuration.

use std::str::FromStr;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use tracing::warn;

use crate::{ApiRequest, RequestStage};

/// Header to add to outbound requests (name + value pair from config).
#[derive(Debug, Clone)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

impl HeaderInjection {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Adds configured headers when the request does not already carry them.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl DefaultHeaders {
    /// Build the stage from name/value pairs, skipping anything invalid.
    pub fn new(injections: Vec<HeaderInjection>) -> Self {
        let mut headers = Vec::with_capacity(injections.len());
        for injection in injections {
            let name = match HeaderName::from_str(&injection.name) {
                Ok(n) => n,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header name");
                    continue;
                }
            };
            if name == AUTHORIZATION {
                warn!(header = %injection.name, "refusing to inject authorization from static headers");
                continue;
            }
            let value = match HeaderValue::from_str(&injection.value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(header = %injection.name, error = %e, "skipping invalid header value");
                    continue;
                }
            };
            headers.push((name, value));
        }
        Self { headers }
    }

    /// `Content-Type: application/json` and `Accept: application/json`.
    pub fn json() -> Self {
        Self {
            headers: vec![
                (CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (ACCEPT, HeaderValue::from_static("application/json")),
            ],
        }
    }

    /// Extend this stage with additional injections.
    pub fn and(mut self, extra: Vec<HeaderInjection>) -> Self {
        self.headers.extend(Self::new(extra).headers);
        self
    }
}

impl RequestStage for DefaultHeaders {
    fn name(&self) -> &str {
        "default-headers"
    }

    fn apply(&self, request: ApiRequest) -> ApiRequest {
        self.headers.iter().fold(request, |request, (name, value)| {
            if request.headers().contains_key(name) {
                request
            } else {
                request.with_header(name.clone(), value.clone())
            }
        })
    }
}

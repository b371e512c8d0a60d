//! Bearer request stage
//!
//! Reads the access credential from the `TokenStore` at the moment a request
//! is dispatched. With no stored credential the request passes through
//! untouched, which is what public endpoints (e.g. payment-link lookup) rely on.

use std::sync::Arc;

use transport::header::{AUTHORIZATION, HeaderValue};
use transport::{ApiRequest, RequestStage};
use tracing::warn;

use crate::constants::BEARER_PREFIX;
use crate::token_store::TokenStore;

/// Attaches `Authorization: Bearer <access>` from the shared store.
#[derive(Clone)]
pub struct BearerInterceptor {
    store: Arc<TokenStore>,
}

impl BearerInterceptor {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    /// Decorate `request` with the current access credential.
    pub fn decorate(&self, request: ApiRequest) -> ApiRequest {
        let Some(access) = self.store.access() else {
            return request;
        };
        match HeaderValue::from_str(&format!("{BEARER_PREFIX}{}", access.as_str())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.with_header(AUTHORIZATION, value)
            }
            Err(e) => {
                warn!(error = %e, "stored access credential is not a valid header value, sending without it");
                request
            }
        }
    }
}

impl RequestStage for BearerInterceptor {
    fn name(&self) -> &str {
        "bearer"
    }

    fn apply(&self, request: ApiRequest) -> ApiRequest {
        self.decorate(request)
    }
}

/// The bearer credential a request was (or will be) sent with.
pub fn bearer_token(request: &ApiRequest) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
}

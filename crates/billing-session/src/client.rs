//! Authenticated API client
//!
//! Composes the request pipeline, transport, classifier and refresh
//! coordinator into the single "send an authenticated request" operation the
//! rest of the application consumes. Callers see either the final response,
//! a surfaced non-2xx, a network error, or a terminal authentication failure.

use std::sync::Arc;
use std::time::Duration;

use billing_auth::exchange::{self, Profile};
use billing_auth::{BearerInterceptor, Session, TokenStore, bearer_token};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, info_span, warn};
use transport::{
    ApiRequest, ApiResponse, DefaultHeaders, HeaderInjection, Pipeline, Transport,
};

use crate::classify::{Classification, classify};
use crate::coordinator::{RefreshCoordinator, RefreshOutcome};
use crate::error::{ClientError, Result};
use crate::invalidator::SessionInvalidator;
use crate::metrics;

/// Per-call network timeout when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Refresh exchange timeout when none is configured.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Tunables for `AuthenticatedClient`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for the original request and for its replay
    pub request_timeout: Duration,
    /// Timeout for the refresh exchange
    pub refresh_timeout: Duration,
    /// Extra headers added to every request (never Authorization)
    pub headers: Vec<HeaderInjection>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

/// Client that keeps expired access credentials invisible to its callers.
///
/// Everything is injected: the store, transport and invalidator are shared
/// via `Arc` and no ambient global state is consulted.
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    invalidator: Arc<SessionInvalidator>,
    pipeline: Pipeline,
    coordinator: RefreshCoordinator,
    request_timeout: Duration,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        invalidator: Arc<SessionInvalidator>,
        options: ClientOptions,
    ) -> Self {
        let pipeline = Pipeline::new()
            .with_stage(Arc::new(DefaultHeaders::json().and(options.headers)))
            .with_stage(Arc::new(BearerInterceptor::new(store.clone())));
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            invalidator.clone(),
            options.refresh_timeout,
        );
        info!(
            stages = ?pipeline.stage_names(),
            request_timeout_ms = options.request_timeout.as_millis() as u64,
            refresh_timeout_ms = options.refresh_timeout.as_millis() as u64,
            "authenticated client initialized"
        );
        Self {
            transport,
            store,
            invalidator,
            pipeline,
            coordinator,
            request_timeout: options.request_timeout,
        }
    }

    /// Send a request, refreshing and replaying once on an expired credential.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method(),
            path = request.path(),
        );
        let result = self.dispatch(request).instrument(span).await;
        metrics::record_request(match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        });
        result
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let timeout = request.timeout().unwrap_or(self.request_timeout);

        let outbound = self.pipeline.apply(request.clone());
        let sent_with = bearer_token(&outbound).map(str::to_owned);
        let outcome = self.transport.send(&outbound, timeout).await;

        match classify(&outbound, outcome) {
            Classification::Unauthorized(original) => {
                debug!("request unauthorized, awaiting refresh");
                match self.coordinator.await_refresh(sent_with.as_deref()).await {
                    RefreshOutcome::Refreshed => self.replay(&request, timeout).await,
                    RefreshOutcome::Failed => Err(ClientError::Unauthorized(original)),
                }
            }
            other => finish(other),
        }
    }

    /// Resend `request` once with the freshly stored access credential.
    async fn replay(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse> {
        let replay = self.pipeline.apply(request.as_retry());
        info!(
            method = %replay.method(),
            path = replay.path(),
            "replaying request with refreshed credential"
        );
        metrics::record_replay();
        let outcome = self.transport.send(&replay, timeout).await;
        finish(classify(&replay, outcome))
    }

    /// Send and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// `GET path`, decoding the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// `POST path` with a JSON body, decoding the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).with_json(body)?;
        self.send_json(request).await
    }

    /// Log in and store both credentials.
    ///
    /// Sent without Authorization and never routed through the refresh path.
    pub async fn login(&self, username: &str, password: &str) -> Result<Profile> {
        let response =
            exchange::login(self.transport.as_ref(), username, password, self.request_timeout)
                .await?;
        self.store.set_session(response.access, response.refresh);
        self.invalidator.rearm();
        info!(username = ?response.profile.username, "logged in");
        Ok(response.profile)
    }

    /// Tell the backend to blacklist the refresh credential, then clear the
    /// local session.
    ///
    /// The backend call is best effort and bypasses the refresh path; the
    /// invalidator is not fired because the host asked for this.
    pub async fn logout(&self) {
        if let Some(refresh) = self.store.refresh() {
            match exchange::logout_request(refresh.as_str()) {
                Ok(request) => {
                    let outbound = self.pipeline.apply(request);
                    match self.transport.send(&outbound, self.request_timeout).await {
                        Ok(response) if response.is_success() => debug!("logout acknowledged"),
                        Ok(response) => {
                            warn!(status = response.status().as_u16(), "logout rejected by backend")
                        }
                        Err(e) => warn!(error = %e, "logout request failed"),
                    }
                }
                Err(e) => warn!(error = %e, "could not build logout request"),
            }
        }
        self.store.clear();
        info!("logged out");
    }

    /// Drop local credentials without contacting the backend.
    pub fn clear_session(&self) {
        self.store.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Copy of the current session.
    pub fn session(&self) -> Session {
        self.store.get()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }
}

/// Terminal mapping for every classification except a first-attempt 401.
fn finish(classification: Classification) -> Result<ApiResponse> {
    match classification {
        Classification::Success(response) => Ok(response),
        Classification::Unauthorized(response) | Classification::OtherHttp(response) => {
            Err(ClientError::from_response(response))
        }
        Classification::Network(e) => Err(ClientError::Network(e)),
    }
}

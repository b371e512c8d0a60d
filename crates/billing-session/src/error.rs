//! Errors surfaced to callers of the authenticated client

use transport::{ApiResponse, StatusCode, TransportError};

/// Errors returned by `AuthenticatedClient`.
///
/// An expired access credential never shows up here: it is either recovered
/// (refresh + replay) or reported as `Unauthorized` carrying the response the
/// caller would have seen.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// No HTTP response (timeout, refused, reset). Session untouched.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// Terminal authentication failure: a 401 on the replay, or the original
    /// 401 after the session could not be refreshed.
    #[error("authentication failed ({})", .0.status())]
    Unauthorized(ApiResponse),

    /// Any other non-2xx status, returned unchanged.
    #[error("HTTP {}: {}", .0.status(), .0.body_snippet())]
    Http(ApiResponse),

    /// Login or logout failed at the auth endpoints.
    #[error(transparent)]
    Auth(#[from] billing_auth::Error),

    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Wrap a non-2xx response, routing 401 to `Unauthorized`.
    pub fn from_response(response: ApiResponse) -> Self {
        if response.status() == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized(response)
        } else {
            ClientError::Http(response)
        }
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(ApiResponse::status)
    }

    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ClientError::Unauthorized(r) | ClientError::Http(r) => Some(r),
            _ => None,
        }
    }

    /// Whether the caller should treat the session as gone.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthorized(_)
                | ClientError::Auth(billing_auth::Error::InvalidCredentials(_))
        )
    }

    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ClientError::Network(_) => "network",
            ClientError::Unauthorized(_) => "unauthorized",
            ClientError::Http(_) => "http_error",
            ClientError::Auth(_) => "auth_error",
            ClientError::Decode(_) => "decode_error",
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

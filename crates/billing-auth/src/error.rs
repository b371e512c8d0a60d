//! Error types for credential operations

use transport::TransportError;

/// Errors from storage access and the auth endpoints.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    /// The backend rejected the presented credential (refresh token or login).
    #[error("credentials rejected: {0}")]
    InvalidCredentials(String),

    /// Non-2xx other than a rejection, or a body that does not match the contract.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Auth endpoint wire contract
//!
//! Handles the two credential-minting calls:
//! 1. Login (`POST /api/auth/login/`) returns both credentials plus a profile
//! 2. Refresh (`POST /api/auth/refresh/`) trades the refresh credential for a
//!    new access credential
//!
//! Both are sent without an Authorization header. Logout is an ordinary
//! authenticated request, so only its request value is built here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use transport::{ApiRequest, ApiResponse, Transport};
use tracing::{debug, warn};

use crate::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Successful refresh response.
///
/// `refresh` is only present when the backend rotates refresh credentials.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// User details returned alongside the login credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

/// Successful login response.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
struct LogoutBody<'a> {
    refresh_token: &'a str,
}

/// `POST /api/auth/refresh/` with `{"refresh": ...}`.
pub fn refresh_request(refresh: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::post(REFRESH_PATH).with_json(&RefreshBody { refresh })?)
}

/// `POST /api/auth/login/` with `{"username": ..., "password": ...}`.
pub fn login_request(username: &str, password: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::post(LOGIN_PATH).with_json(&LoginBody { username, password })?)
}

/// `POST /api/auth/logout/` with `{"refresh_token": ...}`.
pub fn logout_request(refresh: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::post(LOGOUT_PATH).with_json(&LogoutBody {
        refresh_token: refresh,
    })?)
}

/// Exchange a refresh credential for a new access credential.
///
/// Any non-2xx status or a body without `access` is a failure. 400/401/403
/// mean the refresh credential itself was rejected.
pub async fn refresh_access(
    transport: &dyn Transport,
    refresh: &str,
    timeout: Duration,
) -> Result<RefreshResponse> {
    let request = refresh_request(refresh)?;
    let response = transport.send(&request, timeout).await?;

    if !response.is_success() {
        let status = response.status();
        let detail = error_detail(&response);
        if is_rejection(status.as_u16()) {
            warn!(status = status.as_u16(), "refresh credential rejected");
            return Err(Error::InvalidCredentials(format!(
                "refresh rejected ({status}): {detail}"
            )));
        }
        return Err(Error::Exchange(format!(
            "refresh returned {status}: {detail}"
        )));
    }

    let parsed: RefreshResponse = response
        .json()
        .map_err(|e| Error::Exchange(format!("invalid refresh response: {e}")))?;
    if parsed.access.is_empty() {
        return Err(Error::Exchange("refresh response carried an empty access credential".into()));
    }
    debug!(rotated = parsed.refresh.is_some(), "refresh exchange succeeded");
    Ok(parsed)
}

/// Log in with a username (or email) and password.
pub async fn login(
    transport: &dyn Transport,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<LoginResponse> {
    let request = login_request(username, password)?;
    let response = transport.send(&request, timeout).await?;

    if !response.is_success() {
        let status = response.status();
        let detail = error_detail(&response);
        if is_rejection(status.as_u16()) {
            return Err(Error::InvalidCredentials(detail));
        }
        return Err(Error::Exchange(format!("login returned {status}: {detail}")));
    }

    let parsed: LoginResponse = response
        .json()
        .map_err(|e| Error::Exchange(format!("invalid login response: {e}")))?;
    if parsed.access.is_empty() || parsed.refresh.is_empty() {
        return Err(Error::Exchange("login response is missing credentials".into()));
    }
    Ok(parsed)
}

fn is_rejection(status: u16) -> bool {
    matches!(status, 400 | 401 | 403)
}

/// Human-readable reason from a DRF-style error body.
///
/// Looks at `detail`, then the first `non_field_errors` entry, then falls
/// back to the raw body.
fn error_detail(response: &ApiResponse) -> String {
    if let Ok(value) = response.json::<serde_json::Value>() {
        if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
        if let Some(first) = value
            .get("non_field_errors")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first())
            .and_then(|e| e.as_str())
        {
            return first.to_string();
        }
    }
    let snippet = response.body_snippet();
    if snippet.is_empty() {
        String::from("<no body>")
    } else {
        snippet
    }
}

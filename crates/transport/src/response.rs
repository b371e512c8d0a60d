//! Buffered HTTP response

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

/// Maximum number of body bytes kept in `body_snippet` output.
const MAX_SNIPPET_LEN: usize = 500;

/// Status, headers and fully-read body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Response with a status and body and no headers (used by test doubles).
    pub fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Lossy UTF-8 view of the body, truncated for log and error messages.
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        if text.len() <= MAX_SNIPPET_LEN {
            return text.into_owned();
        }
        let mut end = MAX_SNIPPET_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... ({} bytes total)", &text[..end], self.body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_decodes_body() {
        let response = ApiResponse::with_status(StatusCode::OK, r#"{"access":"A2"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["access"], "A2");
        assert!(response.is_success());
    }

    #[test]
    fn body_snippet_truncates_long_bodies() {
        let body = "x".repeat(2_000);
        let response = ApiResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR, body);
        let snippet = response.body_snippet();
        assert!(snippet.starts_with(&"x".repeat(MAX_SNIPPET_LEN)));
        assert!(snippet.ends_with("(2000 bytes total)"));
        assert!(!response.is_success());
    }

    #[test]
    fn body_snippet_keeps_short_bodies() {
        let response =
            ApiResponse::with_status(StatusCode::UNAUTHORIZED, r#"{"detail":"expired"}"#);
        assert_eq!(response.body_snippet(), r#"{"detail":"expired"}"#);
    }
}

//! Immutable request descriptor
//!
//! An `ApiRequest` is never mutated after it has been handed to the client.
//! Every decoration (headers, retry marking) produces a new value, so a
//! request shared between a waiting caller and the refresh path cannot be
//! changed underneath either of them.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::TransportError;

/// Method, path, headers and body of one logical API call.
///
/// `retried` records whether this value is the single automatic replay the
/// refresh path is allowed to issue.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Return a copy with `name` set to `value`, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Return a copy with `name` removed.
    pub fn without_header(mut self, name: &HeaderName) -> Self {
        self.headers.remove(name);
        self
    }

    /// Return a copy carrying `body` verbatim.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Return a copy whose body is `value` encoded as JSON.
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, TransportError> {
        let encoded = serde_json::to_vec(value)
            .map_err(|e| TransportError::InvalidRequest(format!("encoding JSON body: {e}")))?;
        Ok(self
            .with_header(
                reqwest::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(encoded))
    }

    /// Return a copy with a per-call timeout overriding the client default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Produce the replay of this request: same descriptor, `retried = true`.
    pub fn as_retry(&self) -> Self {
        Self {
            retried: true,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

    #[test]
    fn new_request_is_not_retried() {
        let request = ApiRequest::get("/api/invoices/");
        assert_eq!(*request.method(), Method::GET);
        assert_eq!(request.path(), "/api/invoices/");
        assert!(!request.is_retried());
        assert!(request.headers().is_empty());
        assert!(request.body().is_none());
    }

    #[test]
    fn as_retry_leaves_original_untouched() {
        let original = ApiRequest::post("/api/clients/").with_body("{}");
        let replay = original.as_retry();

        assert!(replay.is_retried());
        assert!(!original.is_retried());
        assert_eq!(replay.path(), original.path());
        assert_eq!(replay.body(), original.body());
    }

    #[test]
    fn with_header_replaces_existing_value() {
        let request = ApiRequest::get("/api/auth/profile/")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer A1"))
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer A2"));

        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer A2");
        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let request = ApiRequest::post("/api/auth/refresh/")
            .with_json(&serde_json::json!({ "refresh": "R1" }))
            .unwrap();

        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_slice(request.body().unwrap()).unwrap();
        assert_eq!(body["refresh"], "R1");
    }

    #[test]
    fn without_header_removes_it() {
        let request = ApiRequest::get("/")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer A1"))
            .without_header(&AUTHORIZATION);
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}

//! Outcome classification
//!
//! Maps the result of one transport exchange onto the four cases the client
//! acts on. Only a 401 on a request that has not yet been replayed is
//! recoverable; the same status on a replay is terminal and surfaces as an
//! ordinary HTTP failure.

use transport::{ApiRequest, ApiResponse, StatusCode, TransportError};

/// What the client should do with a transport outcome.
#[derive(Debug, Clone)]
pub enum Classification {
    /// 2xx
    Success(ApiResponse),
    /// First-attempt 401: run the refresh path
    Unauthorized(ApiResponse),
    /// Any other status, including a 401 on a replay
    OtherHttp(ApiResponse),
    /// No response at all (refused, reset, timed out)
    Network(TransportError),
}

impl Classification {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Success(_) => "success",
            Classification::Unauthorized(_) => "unauthorized",
            Classification::OtherHttp(_) => "http_error",
            Classification::Network(_) => "network",
        }
    }
}

/// Classify the outcome of sending `request`.
pub fn classify(
    request: &ApiRequest,
    outcome: Result<ApiResponse, TransportError>,
) -> Classification {
    match outcome {
        Err(e) => Classification::Network(e),
        Ok(response) if response.is_success() => Classification::Success(response),
        Ok(response) if response.status() == StatusCode::UNAUTHORIZED && !request.is_retried() => {
            Classification::Unauthorized(response)
        }
        Ok(response) => Classification::OtherHttp(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn respond(status: StatusCode) -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::with_status(status, ""))
    }

    #[test]
    fn success_statuses() {
        let request = ApiRequest::get("/api/invoices/");
        assert!(matches!(
            classify(&request, respond(StatusCode::OK)),
            Classification::Success(_)
        ));
        assert!(matches!(
            classify(&request, respond(StatusCode::NO_CONTENT)),
            Classification::Success(_)
        ));
    }

    #[test]
    fn first_401_is_unauthorized() {
        let request = ApiRequest::get("/api/invoices/");
        let classification = classify(&request, respond(StatusCode::UNAUTHORIZED));
        assert!(matches!(classification, Classification::Unauthorized(_)));
        assert_eq!(classification.label(), "unauthorized");
    }

    #[test]
    fn retried_401_is_terminal() {
        let replay = ApiRequest::get("/api/invoices/").as_retry();
        match classify(&replay, respond(StatusCode::UNAUTHORIZED)) {
            Classification::OtherHttp(response) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
            }
            other => panic!("expected OtherHttp(401), got {other:?}"),
        }
    }

    #[test]
    fn forbidden_and_server_errors_never_trigger_refresh() {
        let request = ApiRequest::post("/api/invoices/");
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            assert!(
                matches!(classify(&request, respond(status)), Classification::OtherHttp(_)),
                "{status} must classify as OtherHttp"
            );
        }
    }

    #[test]
    fn missing_response_is_network() {
        let request = ApiRequest::get("/api/invoices/");
        let classification = classify(
            &request,
            Err(TransportError::Timeout(Duration::from_secs(30))),
        );
        assert!(matches!(
            classification,
            Classification::Network(TransportError::Timeout(_))
        ));
        assert_eq!(classification.label(), "network");
    }
}

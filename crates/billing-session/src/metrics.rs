//! Client metrics
//!
//! Emitted through the `metrics` facade; the hosting application decides
//! whether to install a recorder. Without one every call is a no-op.
//!
//! - `auth_refresh_exchanges_total` (counter): label `outcome`
//! - `auth_replays_total` (counter)
//! - `auth_session_invalidations_total` (counter)
//! - `api_requests_total` (counter): label `outcome`

/// Refresh exchange outcome labels.
pub const REFRESH_SUCCESS: &str = "success";
pub const REFRESH_REJECTED: &str = "rejected";
pub const REFRESH_FAILED: &str = "failed";
pub const REFRESH_MISSING: &str = "missing_refresh";

/// Record one finished refresh exchange.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("auth_refresh_exchanges_total", "outcome" => outcome).increment(1);
}

/// Record one replay of an originally-unauthorized request.
pub fn record_replay() {
    metrics::counter!("auth_replays_total").increment(1);
}

pub fn record_invalidation() {
    metrics::counter!("auth_session_invalidations_total").increment(1);
}

/// Record the final outcome returned to a caller.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("api_requests_total", "outcome" => outcome).increment(1);
}

//! Authenticated API client with transparent session refresh
//!
//! Wraps a `Transport` so callers never observe an expired access credential.
//! A 401 on a first attempt parks the request on the `RefreshCoordinator`,
//! which runs at most one refresh exchange per expiry window and shares its
//! outcome with every request that expired in that window. Successful
//! exchanges are followed by exactly one replay per waiting request; a
//! rejected refresh credential clears the session and fires the
//! `SessionInvalidator` once.
//!
//! Request lifecycle:
//! 1. `Pipeline` decorates the request (JSON headers, bearer credential)
//! 2. `Transport::send` performs the exchange
//! 3. `classify()` maps the outcome to Success / Unauthorized / OtherHttp / Network
//! 4. Unauthorized → `RefreshCoordinator::await_refresh()` (start or join)
//! 5. Refreshed → replay once with `retried = true`; Failed → original 401
//!
//! Replaying a non-idempotent request (POST/PATCH) after a 401 can apply it
//! twice if the backend acted on the first attempt before rejecting it. The
//! client accepts that risk and logs each replay at `info` with method and path.

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod invalidator;
pub mod metrics;

pub use classify::{Classification, classify};
pub use client::{AuthenticatedClient, ClientOptions};
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use error::{ClientError, Result};
pub use invalidator::SessionInvalidator;

//! Single-flight refresh state machine
//!
//! States: `Idle` and `Refreshing`. The first request to report a 401 while
//! `Idle` starts the refresh exchange and moves to `Refreshing`; every request
//! that reports a 401 while `Refreshing` joins the same exchange instead of
//! starting another. The exchange task returns the machine to `Idle` before
//! its outcome is released to the waiters, whether it succeeded or failed.
//!
//! The mutex only guards the `Idle`/`Refreshing` decision. Network I/O runs
//! in a spawned task outside the lock, so a caller that is cancelled or times
//! out while waiting cannot abandon an exchange other callers depend on.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use billing_auth::{Error as AuthError, TokenStore, refresh_access};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};
use transport::Transport;

use crate::invalidator::SessionInvalidator;
use crate::metrics;

/// Result of a refresh window, shared by every request that waited on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access credential is in the store; replay the request.
    Refreshed,
    /// The session is gone; surface the original 401.
    Failed,
}

type SharedExchange = Shared<BoxFuture<'static, RefreshOutcome>>;

enum RefreshState {
    Idle,
    Refreshing(SharedExchange),
}

/// Guarantees at most one in-flight refresh exchange per expiry window.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    transport: Arc<dyn Transport>,
    invalidator: Arc<SessionInvalidator>,
    refresh_timeout: Duration,
    state: Arc<Mutex<RefreshState>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        transport: Arc<dyn Transport>,
        invalidator: Arc<SessionInvalidator>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            invalidator,
            refresh_timeout,
            state: Arc::new(Mutex::new(RefreshState::Idle)),
        }
    }

    /// Whether an exchange is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.state), RefreshState::Refreshing(_))
    }

    /// Handle a first-attempt 401 for a request sent with `sent_with`.
    ///
    /// Joins the in-flight exchange if there is one, otherwise starts it. If
    /// the store already holds a different access credential than the one the
    /// request carried, an earlier exchange in this window already succeeded
    /// and the request can be replayed without another exchange.
    pub async fn await_refresh(&self, sent_with: Option<&str>) -> RefreshOutcome {
        let exchange = {
            let mut state = lock(&self.state);
            match &*state {
                RefreshState::Refreshing(exchange) => {
                    debug!("joining in-flight refresh exchange");
                    exchange.clone()
                }
                RefreshState::Idle => {
                    if let Some(current) = self.store.access() {
                        if sent_with != Some(current.as_str()) {
                            debug!("access credential already replaced, skipping exchange");
                            return RefreshOutcome::Refreshed;
                        }
                    }
                    let exchange = self.start_exchange();
                    *state = RefreshState::Refreshing(exchange.clone());
                    exchange
                }
            }
        };
        exchange.await
    }

    /// Spawn the exchange task. Caller must hold the state lock.
    fn start_exchange(&self) -> SharedExchange {
        info!("access credential expired, starting refresh exchange");

        let store = self.store.clone();
        let transport = self.transport.clone();
        let invalidator = self.invalidator.clone();
        let state = self.state.clone();
        let timeout = self.refresh_timeout;

        let task = tokio::spawn(async move {
            let outcome = run_exchange(&store, transport.as_ref(), timeout).await;
            *lock(&state) = RefreshState::Idle;
            if outcome == RefreshOutcome::Failed {
                invalidator.invalidate();
            }
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "refresh task aborted");
                RefreshOutcome::Failed
            })
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

/// One refresh exchange against the backend, applied to the store.
///
/// The refresh credential is read here, when the exchange starts, not when
/// the triggering request was dispatched.
async fn run_exchange(
    store: &TokenStore,
    transport: &dyn Transport,
    timeout: Duration,
) -> RefreshOutcome {
    let Some(refresh) = store.refresh() else {
        warn!("no refresh credential stored, clearing session");
        metrics::record_refresh(metrics::REFRESH_MISSING);
        store.clear();
        return RefreshOutcome::Failed;
    };

    match refresh_access(transport, refresh.as_str(), timeout).await {
        Ok(response) => {
            match response.refresh {
                Some(rotated) => store.set_session(response.access, rotated),
                None => store.set_access(response.access),
            }
            metrics::record_refresh(metrics::REFRESH_SUCCESS);
            info!("refresh exchange succeeded");
            RefreshOutcome::Refreshed
        }
        Err(e) => {
            let label = match e {
                AuthError::InvalidCredentials(_) => metrics::REFRESH_REJECTED,
                _ => metrics::REFRESH_FAILED,
            };
            metrics::record_refresh(label);
            warn!(error = %e, "refresh exchange failed, clearing session");
            store.clear();
            RefreshOutcome::Failed
        }
    }
}

fn lock(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_auth::{MemoryStorage, Session};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transport::{ApiRequest, ApiResponse, BoxFuture as TransportFuture, StatusCode, TransportError};

    /// Refresh endpoint double: counts exchanges, waits `delay`, then answers
    /// with `reply`.
    struct RefreshEndpoint {
        calls: AtomicUsize,
        delay: Duration,
        reply: std::result::Result<ApiResponse, TransportError>,
    }

    impl RefreshEndpoint {
        fn ok(access: &str) -> Self {
            Self::replying(Ok(ApiResponse::with_status(
                StatusCode::OK,
                format!(r#"{{"access":"{access}"}}"#),
            )))
        }

        fn replying(reply: std::result::Result<ApiResponse, TransportError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                reply,
            }
        }
    }

    impl Transport for RefreshEndpoint {
        fn send<'a>(
            &'a self,
            request: &'a ApiRequest,
            _timeout: Duration,
        ) -> TransportFuture<'a, transport::Result<ApiResponse>> {
            assert_eq!(request.path(), billing_auth::REFRESH_PATH);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.reply.clone()
            })
        }
    }

    struct Fixture {
        store: Arc<TokenStore>,
        endpoint: Arc<RefreshEndpoint>,
        invalidations: Arc<AtomicUsize>,
        coordinator: Arc<RefreshCoordinator>,
    }

    fn fixture(session: &[(&str, &str)], endpoint: RefreshEndpoint) -> Fixture {
        let storage = Arc::new(MemoryStorage::with_entries(session.iter().copied()));
        let store = Arc::new(TokenStore::load(storage).unwrap());
        let endpoint = Arc::new(endpoint);
        let invalidations = Arc::new(AtomicUsize::new(0));
        let counter = invalidations.clone();
        let invalidator = Arc::new(SessionInvalidator::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            endpoint.clone(),
            invalidator,
            Duration::from_secs(5),
        ));
        Fixture {
            store,
            endpoint,
            invalidations,
            coordinator,
        }
    }

    const EXPIRED: &[(&str, &str)] = &[("access_token", "A1"), ("refresh_token", "R1")];

    #[tokio::test(start_paused = true)]
    async fn single_waiter_refreshes_once() {
        let f = fixture(EXPIRED, RefreshEndpoint::ok("A2"));

        let outcome = f.coordinator.await_refresh(Some("A1")).await;

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.get(), Session::new("A2", "R1"));
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_one_exchange() {
        let f = fixture(EXPIRED, RefreshEndpoint::ok("A2"));

        let waiters: Vec<_> = (0..10)
            .map(|_| {
                let coordinator = f.coordinator.clone();
                tokio::spawn(async move { coordinator.await_refresh(Some("A1")).await })
            })
            .collect();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), RefreshOutcome::Refreshed);
        }

        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.access().unwrap().as_str(), "A2");
    }

    #[tokio::test(start_paused = true)]
    async fn late_401_after_refresh_skips_exchange() {
        let f = fixture(EXPIRED, RefreshEndpoint::ok("A2"));
        f.coordinator.await_refresh(Some("A1")).await;

        // A request dispatched with A1 before the refresh answers late.
        let outcome = f.coordinator.await_refresh(Some("A1")).await;

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_window_after_success_starts_new_exchange() {
        let f = fixture(EXPIRED, RefreshEndpoint::ok("A2"));
        f.coordinator.await_refresh(Some("A1")).await;

        // A2 itself expires later.
        f.coordinator.await_refresh(Some("A2")).await;

        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_refresh_clears_and_invalidates_once() {
        let f = fixture(
            EXPIRED,
            RefreshEndpoint::replying(Ok(ApiResponse::with_status(
                StatusCode::UNAUTHORIZED,
                r#"{"detail":"Token is invalid or expired"}"#,
            ))),
        );

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = f.coordinator.clone();
                tokio::spawn(async move { coordinator.await_refresh(Some("A1")).await })
            })
            .collect();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), RefreshOutcome::Failed);
        }

        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.invalidations.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.get(), Session::default());
        assert!(!f.coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_timeout_is_a_failed_exchange() {
        let f = fixture(
            EXPIRED,
            RefreshEndpoint::replying(Err(TransportError::Timeout(Duration::from_secs(5)))),
        );

        assert_eq!(
            f.coordinator.await_refresh(Some("A1")).await,
            RefreshOutcome::Failed
        );
        assert!(!f.store.is_authenticated());
        assert_eq!(f.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_refresh_fails_without_network_call() {
        let f = fixture(&[("access_token", "A1")], RefreshEndpoint::ok("A2"));

        assert_eq!(
            f.coordinator.await_refresh(Some("A1")).await,
            RefreshOutcome::Failed
        );
        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.invalidations.load(Ordering::SeqCst), 1);
        assert!(f.store.access().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rotated_refresh_replaces_both_credentials() {
        let f = fixture(
            EXPIRED,
            RefreshEndpoint::replying(Ok(ApiResponse::with_status(
                StatusCode::OK,
                r#"{"access":"A2","refresh":"R2"}"#,
            ))),
        );

        f.coordinator.await_refresh(Some("A1")).await;
        assert_eq!(f.store.get(), Session::new("A2", "R2"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_initiator_does_not_abandon_exchange() {
        let f = fixture(EXPIRED, RefreshEndpoint::ok("A2"));

        let initiator = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.await_refresh(Some("A1")).await })
        };
        tokio::task::yield_now().await;
        initiator.abort();

        let outcome = f.coordinator.await_refresh(Some("A1")).await;
        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(f.endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.access().unwrap().as_str(), "A2");
    }
}

//! Session invalidation callback
//!
//! The hosting application decides what "the session is gone" means (redirect
//! to login, exit a CLI, drop cached views). The client only guarantees the
//! callback fires at most once per invalidation window; the window is
//! re-armed when a new session is established by login.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

type Callback = Box<dyn Fn() + Send + Sync>;

/// Once-per-window wrapper around the host's logout hook.
pub struct SessionInvalidator {
    callback: Callback,
    invalidated: AtomicBool,
}

impl SessionInvalidator {
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Invalidator that only logs.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Fire the callback unless it already fired in this window.
    ///
    /// Returns whether the callback ran.
    pub fn invalidate(&self) -> bool {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            debug!("session already invalidated, skipping callback");
            return false;
        }
        info!("session invalidated");
        crate::metrics::record_invalidation();
        (self.callback)();
        true
    }

    /// Open a new window (called after a successful login).
    pub fn rearm(&self) {
        self.invalidated.store(false, Ordering::Release);
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SessionInvalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInvalidator")
            .field("invalidated", &self.is_invalidated())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, SessionInvalidator) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let invalidator = SessionInvalidator::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (calls, invalidator)
    }

    #[test]
    fn fires_once_per_window() {
        let (calls, invalidator) = counting();

        assert!(invalidator.invalidate());
        assert!(!invalidator.invalidate());
        assert!(!invalidator.invalidate());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(invalidator.is_invalidated());
    }

    #[test]
    fn rearm_opens_a_new_window() {
        let (calls, invalidator) = counting();

        invalidator.invalidate();
        invalidator.rearm();
        assert!(!invalidator.is_invalidated());
        invalidator.invalidate();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_callers_fire_once() {
        let (calls, invalidator) = counting();
        let invalidator = Arc::new(invalidator);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let invalidator = invalidator.clone();
                std::thread::spawn(move || invalidator.invalidate())
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ran| *ran)
            .count();

        assert_eq!(fired, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! One-way circuit breaker for replica capabilities.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tandem_core::TandemResult;
use tracing::warn;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    /// Replicas are used normally.
    Closed,
    /// A replica rejected an operation as unsupported; everything goes to main.
    Open,
}

/// Trips the first time a replica reports an unsupported capability and
/// stays open until [`reset`](CircuitBreaker::reset).
///
/// Share one breaker through `Arc` across every session that should fall
/// back to main together.
#[derive(Default)]
pub struct CircuitBreaker {
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BreakerState {
        if self.open.load(Ordering::SeqCst) {
            BreakerState::Open
        } else {
            BreakerState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    /// Whether replicas may still be used.
    pub fn can_call(&self) -> bool {
        !self.is_open()
    }

    pub fn trip(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            warn!("replica capability unsupported, routing everything to main");
        }
    }

    pub fn reset(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Run `operation`, tripping the breaker if it fails with an
    /// unsupported capability. The error is returned either way.
    pub fn guard<T>(&self, operation: impl FnOnce() -> TandemResult<T>) -> TandemResult<T> {
        let result = operation();
        if let Err(e) = &result {
            if e.is_unsupported_capability() {
                warn!(error = %e, "tripping circuit breaker");
                self.trip();
            }
        }
        result
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .finish()
    }
}

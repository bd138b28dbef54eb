//! Routing chiefs: pluggable rules that can force an operation to main.

use crate::breaker::CircuitBreaker;
use crate::classifier::SqlClassifier;
use std::fmt;
use std::sync::Arc;
use tandem_core::{ConsistencyTracker, HandleSupplier, Reason, RouteDecisionBuilder};
use tracing::{debug, warn};

/// Can override the routing decision for one operation.
///
/// A chief only ever moves an operation towards main by setting a reason
/// that runs there. `replicas` lazily open replica handles; chiefs that do
/// not need a replica must not call them.
pub trait Chief: Send + Sync {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, replicas: &[&dyn HandleSupplier]);
}

impl<C: Chief + ?Sized> Chief for Arc<C> {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, replicas: &[&dyn HandleSupplier]) {
        (**self).override_decision(decision, replicas)
    }
}

/// Runs chiefs in order until one of them sends the operation to main.
///
/// Order matters: cheap chiefs go first so expensive ones, such as a
/// consistency check, only run for operations still bound for a replica.
#[derive(Clone, Default)]
pub struct ChainOfChiefs {
    chiefs: Vec<Arc<dyn Chief>>,
}

impl ChainOfChiefs {
    pub fn new(chiefs: Vec<Arc<dyn Chief>>) -> Self {
        Self { chiefs }
    }

    /// Breaker, then write detection, then the consistency guard.
    pub fn standard(
        classifier: SqlClassifier,
        tracker: Arc<dyn ConsistencyTracker>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self::new(vec![
            Arc::new(BreakerChief::new(breaker)),
            Arc::new(WriteDetectingChief::new(classifier)),
            Arc::new(ConsistencyGuardingChief::new(tracker)),
        ])
    }

    pub fn then(mut self, chief: Arc<dyn Chief>) -> Self {
        self.chiefs.push(chief);
        self
    }

    pub fn len(&self) -> usize {
        self.chiefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chiefs.is_empty()
    }
}

impl Chief for ChainOfChiefs {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, replicas: &[&dyn HandleSupplier]) {
        for chief in &self.chiefs {
            if decision.will_run_on_main() {
                break;
            }
            chief.override_decision(decision, replicas);
        }
    }
}

impl fmt::Debug for ChainOfChiefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainOfChiefs")
            .field("chiefs", &self.chiefs.len())
            .finish()
    }
}

/// Sends writes and row locks to main.
#[derive(Debug, Clone, Default)]
pub struct WriteDetectingChief {
    classifier: SqlClassifier,
}

impl WriteDetectingChief {
    pub fn new(classifier: SqlClassifier) -> Self {
        Self { classifier }
    }
}

impl Chief for WriteDetectingChief {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, _replicas: &[&dyn HandleSupplier]) {
        let sql = decision.get_sql();
        if self.classifier.is_write_operation(sql) {
            decision.set_reason(Reason::WriteOperation);
        } else if self.classifier.is_select_for_update(sql) {
            decision.set_reason(Reason::Lock);
        }
    }
}

/// Sends reads to main while the replica lags behind recorded writes.
pub struct ConsistencyGuardingChief {
    tracker: Arc<dyn ConsistencyTracker>,
}

impl ConsistencyGuardingChief {
    pub fn new(tracker: Arc<dyn ConsistencyTracker>) -> Self {
        Self { tracker }
    }
}

impl Chief for ConsistencyGuardingChief {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, replicas: &[&dyn HandleSupplier]) {
        let Some(first) = replicas.first() else {
            warn!("no replica to check consistency against");
            return;
        };
        if !self.tracker.is_consistent(*first) {
            debug!(sql = ?decision.get_sql(), "replica inconsistent, reading from main");
            decision.set_reason(Reason::ReplicaInconsistent);
        }
    }
}

impl fmt::Debug for ConsistencyGuardingChief {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyGuardingChief").finish_non_exhaustive()
    }
}

/// Sends everything to main once the breaker is open.
#[derive(Debug, Clone)]
pub struct BreakerChief {
    breaker: Arc<CircuitBreaker>,
}

impl BreakerChief {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl Chief for BreakerChief {
    fn override_decision(&self, decision: &mut RouteDecisionBuilder, _replicas: &[&dyn HandleSupplier]) {
        if !self.breaker.can_call() {
            decision.set_reason(Reason::CircuitOpen);
        }
    }
}

//! Lag-based consistency: the replica is assumed to trail main by a fixed lag.

use std::sync::Arc;
use std::time::Duration;
use tandem_cache::{Cache, MonotonicCache};
use tandem_core::{
    saturating_sub, Clock, ConsistencyConfig, ConsistencyTracker, Handle, HandleSupplier,
    Timestamp,
};

/// Considers the replica caught up once `lag` has passed since the last write.
///
/// Never talks to the replica. The last write starts at construction time,
/// so a freshly built tracker reports inconsistent for the first `lag`.
#[derive(Debug)]
pub struct ClockConsistency {
    clock: Arc<dyn Clock>,
    lag: Duration,
    last_write: MonotonicCache<Timestamp>,
}

impl ClockConsistency {
    pub fn new(clock: Arc<dyn Clock>, lag: Duration) -> Self {
        let last_write = MonotonicCache::with_value(clock.now());
        Self {
            clock,
            lag,
            last_write,
        }
    }

    pub fn from_config(clock: Arc<dyn Clock>, config: &ConsistencyConfig) -> Self {
        Self::new(clock, config.clock_lag)
    }

    pub fn last_write(&self) -> Option<Timestamp> {
        self.last_write.get()
    }
}

impl ConsistencyTracker for ClockConsistency {
    fn write(&self, _main: &Handle) {
        self.last_write.put(self.clock.now());
    }

    fn is_consistent(&self, _replica: &dyn HandleSupplier) -> bool {
        let last_refresh = saturating_sub(self.clock.now(), self.lag);
        match self.last_write.get() {
            Some(last_write) => last_refresh > last_write,
            None => true,
        }
    }
}

//! Propagation-time consistency, pessimistic when the last write is unknown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tandem_cache::{Cache, MonotonicCache};
use tandem_core::{
    saturating_sub, Clock, ConsistencyConfig, ConsistencyTracker, Handle, HandleSupplier,
    SystemClock, Timestamp,
};
use tracing::debug;

/// Assumes writes reach every replica within `max_propagation`.
///
/// The last write time lives in an injectable [`Cache`], so it can be
/// shared between trackers or dropped by the cache. When it is unknown the
/// tracker assumes a write just happened and stores that assumption, which
/// keeps it from assuming a fresh write on every check.
pub struct PropagationConsistency {
    clock: Arc<dyn Clock>,
    max_propagation: Duration,
    last_write: Arc<dyn Cache<Timestamp>>,
}

impl PropagationConsistency {
    pub fn builder() -> PropagationConsistencyBuilder {
        PropagationConsistencyBuilder::default()
    }

    pub fn max_propagation(&self) -> Duration {
        self.max_propagation
    }

    fn assume_last_write(&self) -> Timestamp {
        if let Some(known) = self.last_write.get() {
            return known;
        }
        let now = self.clock.now();
        debug!(assumed_write = %now, "last write unknown, assuming it just happened");
        self.last_write.put(now);
        now
    }
}

impl ConsistencyTracker for PropagationConsistency {
    fn write(&self, _main: &Handle) {
        self.last_write.put(self.clock.now());
    }

    fn is_consistent(&self, _replica: &dyn HandleSupplier) -> bool {
        let last_write = self.assume_last_write();
        let assumed_refresh = saturating_sub(self.clock.now(), self.max_propagation);
        assumed_refresh > last_write
    }
}

impl fmt::Debug for PropagationConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationConsistency")
            .field("clock", &self.clock)
            .field("max_propagation", &self.max_propagation)
            .field("last_write", &self.last_write.get())
            .finish()
    }
}

/// Builder for [`PropagationConsistency`].
pub struct PropagationConsistencyBuilder {
    clock: Arc<dyn Clock>,
    max_propagation: Duration,
    last_write: Option<Arc<dyn Cache<Timestamp>>>,
}

impl Default for PropagationConsistencyBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            max_propagation: ConsistencyConfig::default().max_propagation,
            last_write: None,
        }
    }
}

impl PropagationConsistencyBuilder {
    /// How long writes take to propagate from main to replicas.
    pub fn assume_max_propagation(mut self, max_propagation: Duration) -> Self {
        self.max_propagation = max_propagation;
        self
    }

    /// Where the last write time is remembered. In memory by default.
    pub fn cache_last_write(mut self, last_write: Arc<dyn Cache<Timestamp>>) -> Self {
        self.last_write = Some(last_write);
        self
    }

    pub fn measure_time(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Take the propagation time from `config`.
    pub fn with_config(self, config: &ConsistencyConfig) -> Self {
        self.assume_max_propagation(config.max_propagation)
    }

    pub fn build(self) -> PropagationConsistency {
        PropagationConsistency {
            clock: self.clock,
            max_propagation: self.max_propagation,
            last_write: self
                .last_write
                .unwrap_or_else(|| Arc::new(MonotonicCache::<Timestamp>::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ManualClock, TandemResult};
    use tandem_test_utils::{HandleKind, MockConnection};

    fn main_handle() -> Handle {
        Handle::main(Arc::new(MockConnection::new("main", HandleKind::Main)))
    }

    fn untouched() -> impl Fn() -> TandemResult<Handle> {
        || -> TandemResult<Handle> { panic!("propagation consistency must not open the replica") }
    }

    fn tracker(clock: &Arc<ManualClock>, cache: Arc<dyn Cache<Timestamp>>) -> PropagationConsistency {
        PropagationConsistency::builder()
            .assume_max_propagation(Duration::from_millis(100))
            .cache_last_write(cache)
            .measure_time(clock.clone())
            .build()
    }

    #[test]
    fn test_default_max_propagation() {
        assert_eq!(
            PropagationConsistency::builder().build().max_propagation(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_max_propagation_from_config() {
        let clock = Arc::new(ManualClock::at_epoch());
        let config = ConsistencyConfig {
            max_propagation: Duration::from_secs(2),
            ..ConsistencyConfig::default()
        };
        let tracker = PropagationConsistency::builder()
            .with_config(&config)
            .measure_time(clock.clone())
            .build();
        assert_eq!(tracker.max_propagation(), Duration::from_secs(2));

        tracker.write(&main_handle());
        clock.advance(Duration::from_millis(1500));
        assert!(!tracker.is_consistent(&untouched()));

        clock.advance(Duration::from_millis(501));
        assert!(tracker.is_consistent(&untouched()));
    }

    #[test]
    fn test_consistent_after_propagation() {
        let clock = Arc::new(ManualClock::at_epoch());
        let tracker = tracker(&clock, Arc::new(MonotonicCache::<Timestamp>::new()));

        tracker.write(&main_handle());
        clock.advance(Duration::from_millis(99));
        assert!(!tracker.is_consistent(&untouched()));

        clock.advance(Duration::from_millis(2));
        assert!(tracker.is_consistent(&untouched()));
    }

    #[test]
    fn test_unknown_write_is_assumed_and_stored() {
        let clock = Arc::new(ManualClock::at_epoch());
        clock.advance(Duration::from_secs(60));
        let cache = Arc::new(MonotonicCache::<Timestamp>::new());
        let tracker = tracker(&clock, cache.clone());

        assert!(!tracker.is_consistent(&untouched()));
        assert_eq!(cache.get(), Some(clock.now()));

        clock.advance(Duration::from_millis(101));
        assert!(tracker.is_consistent(&untouched()));
    }

    #[test]
    fn test_cache_reset_makes_tracker_pessimistic_again() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = Arc::new(MonotonicCache::<Timestamp>::new());
        let tracker = tracker(&clock, cache.clone());

        tracker.write(&main_handle());
        clock.advance(Duration::from_secs(1));
        assert!(tracker.is_consistent(&untouched()));

        cache.reset();
        assert!(!tracker.is_consistent(&untouched()));
    }
}

//! Single-flight cache whose refresh lease expires.

use crate::SuppliedCache;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_core::{to_delta, Clock, ConsistencyConfig, SystemClock, TandemResult, Timestamp};
use tracing::debug;

type Newer<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Lease {
    seq: u64,
    deadline: Timestamp,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    value_seq: u64,
    lease: Option<Lease>,
    next_seq: u64,
}

/// Like [`SingleFlightCache`](crate::SingleFlightCache), but a refresh that
/// holds its lease past `timeout` can be robbed by the next caller.
///
/// Every refresh gets an increasing sequence number. When a robbed refresh
/// finally returns, its value is discarded if a refresh with a higher
/// sequence number has already been stored. With
/// [`sequence_values`](TimedSingleFlightCacheBuilder::sequence_values) the
/// values themselves are known to only grow, and a late value is kept
/// whenever it is larger than the stored one, and an on-time value that is
/// not larger is dropped as stale.
pub struct TimedSingleFlightCache<T> {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    newer: Option<Newer<T>>,
    slot: Mutex<Slot<T>>,
    discarded: AtomicU64,
    stale: AtomicU64,
}

impl<T> TimedSingleFlightCache<T> {
    pub fn builder(timeout: Duration) -> TimedSingleFlightCacheBuilder<T> {
        TimedSingleFlightCacheBuilder {
            clock: Arc::new(SystemClock),
            timeout,
            newer: None,
        }
    }

    /// Builder whose refresh lease lasts `config.refresh_timeout`.
    pub fn from_config(config: &ConsistencyConfig) -> TimedSingleFlightCacheBuilder<T> {
        Self::builder(config.refresh_timeout)
    }

    /// Number of refresh results thrown away because a later refresh had
    /// already been stored.
    pub fn discarded_refreshes(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Number of on-time refresh results thrown away because, with
    /// `sequence_values`, they were not larger than the stored value.
    pub fn stale_refreshes(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    fn acquire(&self) -> Option<u64> {
        let now = self.clock.now();
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lease) = slot.lease {
            if lease.deadline >= now {
                return None;
            }
            debug!(robbed_seq = lease.seq, "refresh lease expired, taking over");
        }
        slot.next_seq += 1;
        let seq = slot.next_seq;
        slot.lease = Some(Lease {
            seq,
            deadline: now
                .checked_add_signed(to_delta(self.timeout))
                .unwrap_or(Timestamp::MAX_UTC),
        });
        Some(seq)
    }
}

impl<T: Clone + Send + Sync> SuppliedCache<T> for TimedSingleFlightCache<T> {
    fn get(&self, supplier: &mut dyn FnMut() -> TandemResult<T>) -> TandemResult<Option<T>> {
        let Some(seq) = self.acquire() else {
            return Ok(self.last());
        };

        let result = supplier();

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.lease.map(|lease| lease.seq) == Some(seq) {
            slot.lease = None;
        }
        let fresh = result?;

        let keep = match (&self.newer, &slot.value) {
            (Some(newer), Some(current)) => newer(&fresh, current),
            (Some(_), None) => true,
            (None, _) => seq > slot.value_seq,
        };
        if keep {
            slot.value = Some(fresh);
            slot.value_seq = slot.value_seq.max(seq);
        } else if seq < slot.value_seq {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(seq, stored_seq = slot.value_seq, "discarding late refresh");
        } else {
            self.stale.fetch_add(1, Ordering::Relaxed);
            debug!(seq, "discarding refresh that did not advance the value");
        }
        Ok(slot.value.clone())
    }

    fn last(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .value
            .clone()
    }
}

impl<T> fmt::Debug for TimedSingleFlightCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedSingleFlightCache")
            .field("timeout", &self.timeout)
            .field("sequence_values", &self.newer.is_some())
            .field("discarded", &self.discarded_refreshes())
            .field("stale", &self.stale_refreshes())
            .finish()
    }
}

/// Builder for [`TimedSingleFlightCache`].
pub struct TimedSingleFlightCacheBuilder<T> {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    newer: Option<Newer<T>>,
}

impl<T> TimedSingleFlightCacheBuilder<T> {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> TimedSingleFlightCache<T> {
        TimedSingleFlightCache {
            clock: self.clock,
            timeout: self.timeout,
            newer: self.newer,
            slot: Mutex::new(Slot {
                value: None,
                value_seq: 0,
                lease: None,
                next_seq: 0,
            }),
            discarded: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }
}

impl<T: Ord + 'static> TimedSingleFlightCacheBuilder<T> {
    /// Values only ever grow, so a late but larger value is still kept.
    pub fn sequence_values(mut self) -> Self {
        self.newer = Some(Arc::new(|fresh: &T, current: &T| fresh > current));
        self
    }
}

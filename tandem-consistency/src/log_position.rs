//! Consistency by comparing log positions of main and replica.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_cache::{Cache, MonotonicCache};
use tandem_core::{ConsistencyTracker, DatabaseProgress, Handle, HandleSupplier, TandemResult};
use tracing::warn;

/// Remembers the furthest main position seen after a write and asks the
/// replica whether it has replayed that far.
///
/// Before the first write there is nothing to wait for and the replica is
/// not queried. A write whose position cannot be read leaves the tracker
/// unsure, and it answers "inconsistent" until a later write succeeds.
pub struct LogPositionConsistency<T> {
    progress: Arc<dyn DatabaseProgress<T>>,
    last_write: MonotonicCache<T>,
    unknown: AtomicBool,
}

impl<T> LogPositionConsistency<T>
where
    T: Ord + Clone + Debug + Send + Sync,
{
    pub fn new(progress: Arc<dyn DatabaseProgress<T>>) -> Self {
        Self {
            progress,
            last_write: MonotonicCache::new(),
            unknown: AtomicBool::new(false),
        }
    }

    /// Position of the latest recorded write, if any.
    pub fn last_write(&self) -> Option<T> {
        self.last_write.get()
    }

    fn replica_position(&self, replica: &dyn HandleSupplier) -> TandemResult<T> {
        let handle = replica.handle()?;
        self.progress.fetch_replica_progress(&handle)
    }
}

impl<T> ConsistencyTracker for LogPositionConsistency<T>
where
    T: Ord + Clone + Debug + Send + Sync,
{
    fn write(&self, main: &Handle) {
        match self.progress.fetch_main_progress(main) {
            Ok(position) => {
                self.last_write.put(position);
                self.unknown.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(error = %e, "failed to read main log position after write");
                self.unknown.store(true, Ordering::SeqCst);
            }
        }
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        if self.unknown.load(Ordering::SeqCst) {
            return false;
        }
        let Some(last_write) = self.last_write.get() else {
            return true;
        };
        match self.replica_position(replica) {
            Ok(position) => position >= last_write,
            Err(e) => {
                warn!(error = %e, "failed to read replica log position");
                false
            }
        }
    }
}

impl<T> fmt::Debug for LogPositionConsistency<T>
where
    T: Ord + Clone + Debug + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPositionConsistency")
            .field("last_write", &self.last_write.get())
            .field("unknown", &self.unknown.load(Ordering::SeqCst))
            .finish()
    }
}

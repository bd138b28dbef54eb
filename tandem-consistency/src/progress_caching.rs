//! Progress comparison with cached positions on both sides.

use std::fmt::{self, Debug};
use std::sync::Arc;
use tandem_cache::{Cache, MonotonicCache, PassThroughCache, SuppliedCache};
use tandem_core::{ConsistencyConfig, ConsistencyTracker, DatabaseProgress, Handle, HandleSupplier};
use tracing::warn;

/// Compares the last known progress of main and replica.
///
/// Main progress is cached after every write; replica progress is read
/// through a [`SuppliedCache`], so a single-flight cache turns concurrent
/// checks into a single replica query. Whenever either side is unknown the
/// tracker answers with its fallback, which is "inconsistent" unless
/// [`fall_back_to_consistency`] was chosen.
///
/// [`fall_back_to_consistency`]: ProgressCachingConsistencyBuilder::fall_back_to_consistency
pub struct ProgressCachingConsistency<T> {
    progress: Arc<dyn DatabaseProgress<T>>,
    last_main: Arc<dyn Cache<T>>,
    last_replica: Arc<dyn SuppliedCache<T>>,
    fallback: bool,
}

impl<T> ProgressCachingConsistency<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    pub fn builder(progress: Arc<dyn DatabaseProgress<T>>) -> ProgressCachingConsistencyBuilder<T> {
        ProgressCachingConsistencyBuilder {
            progress,
            last_main: Arc::new(MonotonicCache::<T>::new()),
            last_replica: Arc::new(PassThroughCache::<T>::new()),
            fallback: false,
        }
    }

    fn replica_caught_up(&self, replica: &dyn HandleSupplier, main: &T) -> bool {
        let progress = &self.progress;
        let fetched = self.last_replica.get(&mut || {
            let handle = replica.handle()?;
            progress.fetch_replica_progress(&handle)
        });
        match fetched {
            Ok(Some(replica_progress)) => replica_progress >= *main,
            Ok(None) => self.fallback,
            Err(e) => {
                warn!(error = %e, "failed to read replica progress");
                false
            }
        }
    }
}

impl<T> ConsistencyTracker for ProgressCachingConsistency<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    fn write(&self, main: &Handle) {
        match self.progress.fetch_main_progress(main) {
            Ok(progress) => self.last_main.put(progress),
            Err(e) => {
                warn!(error = %e, "failed to read main progress after write, forgetting it");
                self.last_main.reset();
            }
        }
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        match self.last_main.get() {
            Some(main) => self.replica_caught_up(replica, &main),
            None => self.fallback,
        }
    }
}

impl<T> Debug for ProgressCachingConsistency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressCachingConsistency")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ProgressCachingConsistency`].
pub struct ProgressCachingConsistencyBuilder<T> {
    progress: Arc<dyn DatabaseProgress<T>>,
    last_main: Arc<dyn Cache<T>>,
    last_replica: Arc<dyn SuppliedCache<T>>,
    fallback: bool,
}

impl<T> ProgressCachingConsistencyBuilder<T> {
    /// Where the last main progress is kept. Monotonic and in memory by default.
    pub fn last_main(mut self, last_main: Arc<dyn Cache<T>>) -> Self {
        self.last_main = last_main;
        self
    }

    /// How the replica progress is read. Not cached by default.
    pub fn last_replica(mut self, last_replica: Arc<dyn SuppliedCache<T>>) -> Self {
        self.last_replica = last_replica;
        self
    }

    /// Answer "consistent" when progress is unknown.
    pub fn fall_back_to_consistency(mut self) -> Self {
        self.fallback = true;
        self
    }

    /// Answer "inconsistent" when progress is unknown.
    pub fn fall_back_to_inconsistency(mut self) -> Self {
        self.fallback = false;
        self
    }

    /// Take the fallback answer from `config`.
    pub fn with_config(mut self, config: &ConsistencyConfig) -> Self {
        self.fallback = config.fall_back_to_consistency;
        self
    }

    pub fn build(self) -> ProgressCachingConsistency<T> {
        ProgressCachingConsistency {
            progress: self.progress,
            last_main: self.last_main,
            last_replica: self.last_replica,
            fallback: self.fallback,
        }
    }
}

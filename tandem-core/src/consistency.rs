//! The consistency-tracking contract.

use crate::{Handle, HandleSupplier};
use std::sync::Arc;

/// Decides whether a replica has caught up with writes made through main.
///
/// Implementations are shared between sessions and must be thread-safe.
/// Failures are never surfaced: a tracker that cannot tell answers
/// "inconsistent", which routes the read to main.
pub trait ConsistencyTracker: Send + Sync {
    /// Record that `main` was just mutated.
    fn write(&self, main: &Handle);

    /// Called right before an explicit commit on `main`.
    fn pre_commit(&self, _main: &Handle) {}

    /// Whether a read served by `replica` would observe every recorded
    /// write. Implementations that can answer without the replica must
    /// not call the supplier.
    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool;
}

impl<C: ConsistencyTracker + ?Sized> ConsistencyTracker for Arc<C> {
    fn write(&self, main: &Handle) {
        (**self).write(main)
    }

    fn pre_commit(&self, main: &Handle) {
        (**self).pre_commit(main)
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        (**self).is_consistent(replica)
    }
}

impl<C: ConsistencyTracker + ?Sized> ConsistencyTracker for Box<C> {
    fn write(&self, main: &Handle) {
        (**self).write(main)
    }

    fn pre_commit(&self, main: &Handle) {
        (**self).pre_commit(main)
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        (**self).is_consistent(replica)
    }
}

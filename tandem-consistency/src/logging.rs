use std::sync::Arc;
use tandem_core::{ConsistencyTracker, Handle, HandleSupplier};
use tracing::debug;

/// Traces every call made to the wrapped tracker at `debug` level.
#[derive(Clone)]
pub struct LoggingConsistency {
    name: String,
    inner: Arc<dyn ConsistencyTracker>,
}

impl LoggingConsistency {
    pub fn new(name: impl Into<String>, inner: Arc<dyn ConsistencyTracker>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

impl ConsistencyTracker for LoggingConsistency {
    fn write(&self, main: &Handle) {
        self.inner.write(main);
        debug!(tracker = %self.name, kind = %main.kind(), "consistency write");
    }

    fn pre_commit(&self, main: &Handle) {
        self.inner.pre_commit(main);
        debug!(tracker = %self.name, kind = %main.kind(), "consistency pre-commit");
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        let consistent = self.inner.is_consistent(replica);
        debug!(tracker = %self.name, consistent, "consistency check");
        consistent
    }
}

impl std::fmt::Debug for LoggingConsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingConsistency")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

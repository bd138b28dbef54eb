use super::State;

/// Observes session state transitions.
///
/// Called synchronously on the session's thread after each transition.
pub trait StateListener: Send + Sync {
    fn transition(&self, from: State, to: State);
}

/// Listener that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStateListener;

impl StateListener for NoOpStateListener {
    fn transition(&self, _from: State, _to: State) {}
}

use std::sync::Mutex;
use tandem_router::{State, StateListener};

/// Listener keeping every transition it was told about.
#[derive(Debug, Default)]
pub struct RecordingStateListener {
    transitions: Mutex<Vec<(State, State)>>,
}

impl RecordingStateListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(State, State)> {
        self.transitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl StateListener for RecordingStateListener {
    fn transition(&self, from: State, to: State) {
        self.transitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((from, to));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which databases a session currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// No handle has been created yet.
    NotInitialised,
    /// Only a replica handle is held.
    Replica,
    /// Main is held because of a write; reads stay on main.
    Main,
    /// Main is held only because the replica lagged or was unavailable.
    /// Reads return to a replica once it catches up.
    CommittedMain,
    Closed,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::NotInitialised => "not_initialised",
            State::Replica => "replica",
            State::Main => "main",
            State::CommittedMain => "committed_main",
            State::Closed => "closed",
        }
    }

    /// Whether the session holds a main handle.
    pub fn holds_main(self) -> bool {
        matches!(self, State::Main | State::CommittedMain)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_main() {
        assert!(State::Main.holds_main());
        assert!(State::CommittedMain.holds_main());
        assert!(!State::Replica.holds_main());
        assert!(!State::Closed.holds_main());
    }

    #[test]
    fn test_serializes_like_display() {
        for state in [State::NotInitialised, State::CommittedMain, State::Closed] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, state.to_string());
        }
    }
}

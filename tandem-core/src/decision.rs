//! Route decisions: where an operation runs and why.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an operation was routed where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Plain read, eligible for a replica.
    ReadOperation,
    /// Statement classified as a write.
    WriteOperation,
    /// Session-level call that mutates state (commit mode, savepoints...).
    RwApiCall,
    /// Session-level call that only reads.
    RoApiCall,
    /// Row lock such as `SELECT ... FOR UPDATE`.
    Lock,
    /// Transaction isolation stricter than read-committed.
    HighIsolationLevel,
    /// Session is pinned to main by an earlier write.
    MainReuse,
    /// The replica has not caught up with the latest write.
    ReplicaInconsistent,
    /// No replica is configured or reachable.
    ReplicaUnavailable,
    /// The circuit breaker forces everything to main.
    CircuitOpen,
}

impl Reason {
    /// Whether an operation with this reason executes on main.
    pub fn runs_on_main(self) -> bool {
        !matches!(self, Reason::ReadOperation | Reason::RoApiCall)
    }

    /// Whether this reason means a real write happened or will happen,
    /// pinning the rest of the session to main.
    pub fn pins_main(self) -> bool {
        matches!(
            self,
            Reason::WriteOperation | Reason::RwApiCall | Reason::Lock | Reason::CircuitOpen
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reason::ReadOperation => "read_operation",
            Reason::WriteOperation => "write_operation",
            Reason::RwApiCall => "rw_api_call",
            Reason::RoApiCall => "ro_api_call",
            Reason::Lock => "lock",
            Reason::HighIsolationLevel => "high_isolation_level",
            Reason::MainReuse => "main_reuse",
            Reason::ReplicaInconsistent => "replica_inconsistent",
            Reason::ReplicaUnavailable => "replica_unavailable",
            Reason::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explains which database an operation used and why.
///
/// When the session state forced the route, `cause` holds the decision
/// that originally put the session in that state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteDecision {
    sql: Option<String>,
    reason: Reason,
    cause: Option<Box<RouteDecision>>,
}

impl RouteDecision {
    pub fn new(sql: Option<String>, reason: Reason, cause: Option<RouteDecision>) -> Self {
        Self {
            sql,
            reason,
            cause: cause.map(Box::new),
        }
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// SQL the decision was made for, absent for API calls.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn cause(&self) -> Option<&RouteDecision> {
        self.cause.as_deref()
    }

    pub fn will_run_on_main(&self) -> bool {
        self.reason.runs_on_main()
    }

    /// Walk the cause chain back to the decision that started it.
    pub fn root_cause(&self) -> &RouteDecision {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(sql) = &self.sql {
            write!(f, " [{}]", sql)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " caused by ({})", cause)?;
        }
        Ok(())
    }
}

/// Mutable decision passed down the routing chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecisionBuilder {
    sql: Option<String>,
    reason: Reason,
    cause: Option<RouteDecision>,
}

impl RouteDecisionBuilder {
    pub fn new(reason: Reason) -> Self {
        Self {
            sql: None,
            reason,
            cause: None,
        }
    }

    /// Seed decision for a statement read.
    pub fn read(sql: impl Into<String>) -> Self {
        Self::new(Reason::ReadOperation).sql(sql)
    }

    /// Seed decision for a statement write.
    pub fn write(sql: impl Into<String>) -> Self {
        Self::new(Reason::WriteOperation).sql(sql)
    }

    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn set_reason(&mut self, reason: Reason) -> &mut Self {
        self.reason = reason;
        self
    }

    pub fn set_cause(&mut self, cause: RouteDecision) -> &mut Self {
        self.cause = Some(cause);
        self
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn get_sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn will_run_on_main(&self) -> bool {
        self.reason.runs_on_main()
    }

    pub fn build(&self) -> RouteDecision {
        RouteDecision {
            sql: self.sql.clone(),
            reason: self.reason,
            cause: self.cause.clone().map(Box::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_stay_off_main() {
        assert!(!Reason::ReadOperation.runs_on_main());
        assert!(!Reason::RoApiCall.runs_on_main());
        assert!(Reason::ReplicaInconsistent.runs_on_main());
        assert!(Reason::MainReuse.runs_on_main());
    }

    #[test]
    fn test_only_real_writes_pin() {
        assert!(Reason::WriteOperation.pins_main());
        assert!(Reason::Lock.pins_main());
        assert!(!Reason::ReplicaInconsistent.pins_main());
        assert!(!Reason::ReplicaUnavailable.pins_main());
        assert!(!Reason::HighIsolationLevel.pins_main());
    }

    #[test]
    fn test_builder_builds_cause_chain() {
        let write = RouteDecisionBuilder::write("UPDATE t SET x = 1").build();
        let mut reuse = RouteDecisionBuilder::read("SELECT 1");
        reuse.set_reason(Reason::MainReuse).set_cause(write.clone());

        let decision = reuse.build();
        assert_eq!(decision.reason(), Reason::MainReuse);
        assert_eq!(decision.sql(), Some("SELECT 1"));
        assert_eq!(decision.cause(), Some(&write));
        assert_eq!(decision.root_cause(), &write);
        assert!(decision.will_run_on_main());
    }

    #[test]
    fn test_decision_display_includes_cause() {
        let cause = RouteDecisionBuilder::write("DELETE FROM t").build();
        let decision = RouteDecision::new(None, Reason::MainReuse, Some(cause));
        let text = format!("{}", decision);
        assert!(text.starts_with("main_reuse"));
        assert!(text.contains("write_operation [DELETE FROM t]"));
    }

    #[test]
    fn test_decision_serializes_reason_snake_case() {
        let decision = RouteDecisionBuilder::new(Reason::ReplicaInconsistent).build();
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reason"], "replica_inconsistent");
        assert!(json["sql"].is_null());
    }
}

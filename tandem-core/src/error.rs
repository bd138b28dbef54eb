//! Error types for TANDEM operations

use crate::HandleKind;
use thiserror::Error;

/// Errors raised while creating or driving database handles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Failed to create {kind} handle: {reason}")]
    HandleCreationFailed { kind: HandleKind, reason: String },

    #[error("Operation {operation} failed on {kind} handle: {reason}")]
    OperationFailed {
        kind: HandleKind,
        operation: String,
        reason: String,
    },

    #[error("Failed to close {kind} handle: {reason}")]
    CloseFailed { kind: HandleKind, reason: String },

    #[error("Session {session} is closed")]
    SessionClosed { session: String },
}

/// Errors raised by the routing layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The replica cannot serve this operation at all. Trips the breaker.
    #[error("Unsupported capability: {capability}")]
    UnsupportedCapability { capability: String },
}

/// Errors raised while measuring replication progress.
///
/// Trackers never surface these to callers; they are logged and turned
/// into an "inconsistent" answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Progress query against {kind} failed: {reason}")]
    ProgressQueryFailed { kind: HandleKind, reason: String },

    #[error("Replica discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Invalid log position {value:?}: {reason}")]
    InvalidLogPosition { value: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all TANDEM errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TandemError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TandemError {
    /// True for the signal that permanently trips a circuit breaker.
    pub fn is_unsupported_capability(&self) -> bool {
        matches!(
            self,
            TandemError::Routing(RoutingError::UnsupportedCapability { .. })
        )
    }
}

/// Result type alias for TANDEM operations.
pub type TandemResult<T> = Result<T, TandemError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display_creation_failed() {
        let err = ConnectionError::HandleCreationFailed {
            kind: HandleKind::Replica,
            reason: "connection refused".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("replica"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_consistency_error_display_progress_query() {
        let err = ConsistencyError::ProgressQueryFailed {
            kind: HandleKind::Main,
            reason: "timeout".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("main"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "clock_lag".to_string(),
            value: "0ns".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("clock_lag"));
        assert!(msg.contains("0ns"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_tandem_error_from_variants() {
        let routing = TandemError::from(RoutingError::UnsupportedCapability {
            capability: "set_read_only".to_string(),
        });
        assert!(matches!(routing, TandemError::Routing(_)));

        let connection = TandemError::from(ConnectionError::SessionClosed {
            session: "s".to_string(),
        });
        assert!(matches!(connection, TandemError::Connection(_)));

        let consistency = TandemError::from(ConsistencyError::DiscoveryFailed {
            reason: "dns".to_string(),
        });
        assert!(matches!(consistency, TandemError::Consistency(_)));
    }

    #[test]
    fn test_unsupported_capability_detection() {
        let err = TandemError::from(RoutingError::UnsupportedCapability {
            capability: "savepoints".to_string(),
        });
        assert!(err.is_unsupported_capability());

        let other = TandemError::from(ConnectionError::OperationFailed {
            kind: HandleKind::Replica,
            operation: "execute".to_string(),
            reason: "savepoints".to_string(),
        });
        assert!(!other.is_unsupported_capability());
    }
}

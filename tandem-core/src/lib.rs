//! TANDEM Core - Shared Types
//!
//! Types and collaborator traits shared by every TANDEM crate. Nothing in
//! here performs I/O: connections, progress queries and replica discovery
//! are traits implemented by the embedding application.

pub mod clock;
pub mod config;
pub mod consistency;
pub mod decision;
pub mod error;
pub mod handle;
pub mod progress;

pub use clock::{saturating_sub, to_delta, Clock, ManualClock, SystemClock, Timestamp};
pub use config::{ConsistencyConfig, RoutingConfig, TandemConfig};
pub use consistency::ConsistencyTracker;
pub use decision::{Reason, RouteDecision, RouteDecisionBuilder};
pub use error::{
    ConfigError, ConnectionError, ConsistencyError, RoutingError, TandemError, TandemResult,
};
pub use handle::{
    ConnectionProvider, DatabaseConnection, Handle, HandleKind, HandleSupplier, IsolationLevel,
    Warning,
};
pub use progress::{DatabaseProgress, LogPosition, ReplicaDiscovery, ReplicaNode};

/// Identifier of a logical session, UUIDv7 so ids sort by creation time.
pub type SessionId = uuid::Uuid;

/// Generate a new session identifier.
pub fn new_session_id() -> SessionId {
    uuid::Uuid::now_v7()
}

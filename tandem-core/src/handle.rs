//! Database handles and the collaborators that create them.
//!
//! A [`Handle`] is a tagged, shared reference to a live connection. The
//! router never talks to a network itself; it drives [`DatabaseConnection`]
//! objects handed out by a [`ConnectionProvider`].

use crate::TandemResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Which database a handle points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Main,
    Replica,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Main => f.write_str("main"),
            HandleKind::Replica => f.write_str("replica"),
        }
    }
}

/// Transaction isolation, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Replicas cannot honour anything stricter than read-committed.
    pub fn exceeds_read_committed(self) -> bool {
        self > IsolationLevel::ReadCommitted
    }
}

/// A warning reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub code: Option<String>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The slice of a database client the router needs.
pub trait DatabaseConnection: Send + Sync + fmt::Debug {
    fn commit(&self) -> TandemResult<()>;

    fn rollback(&self) -> TandemResult<()>;

    fn close(&self) -> TandemResult<()>;

    /// Abort in-flight work, waiting at most `deadline`.
    fn abort(&self, deadline: Duration) -> TandemResult<()>;

    /// Warnings reported since the last clear, oldest first.
    fn warnings(&self) -> TandemResult<Vec<Warning>>;

    fn clear_warnings(&self) -> TandemResult<()>;

    fn set_auto_commit(&self, auto_commit: bool) -> TandemResult<()>;

    fn set_read_only(&self, read_only: bool) -> TandemResult<()>;

    fn set_transaction_isolation(&self, level: IsolationLevel) -> TandemResult<()>;

    /// Execute a statement whose result the router does not need.
    fn execute(&self, sql: &str) -> TandemResult<()>;
}

/// A connection tagged with the database it belongs to.
#[derive(Debug, Clone)]
pub struct Handle {
    kind: HandleKind,
    connection: Arc<dyn DatabaseConnection>,
}

impl Handle {
    pub fn new(kind: HandleKind, connection: Arc<dyn DatabaseConnection>) -> Self {
        Self { kind, connection }
    }

    pub fn main(connection: Arc<dyn DatabaseConnection>) -> Self {
        Self::new(HandleKind::Main, connection)
    }

    pub fn replica(connection: Arc<dyn DatabaseConnection>) -> Self {
        Self::new(HandleKind::Replica, connection)
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn connection(&self) -> &Arc<dyn DatabaseConnection> {
        &self.connection
    }

    /// True when both handles wrap the very same connection object.
    pub fn same_connection(&self, other: &Handle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.connection) as *const (),
            Arc::as_ptr(&other.connection) as *const (),
        )
    }
}

impl Deref for Handle {
    type Target = dyn DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

/// Lazily produces a replica handle.
///
/// Consistency checks receive a supplier rather than a handle so that
/// strategies which never look at the replica never open one.
pub trait HandleSupplier {
    fn handle(&self) -> TandemResult<Handle>;
}

impl<F> HandleSupplier for F
where
    F: Fn() -> TandemResult<Handle>,
{
    fn handle(&self) -> TandemResult<Handle> {
        self()
    }
}

/// Hands out connections to main and to a replica.
pub trait ConnectionProvider: Send + Sync {
    fn is_replica_available(&self) -> bool;

    fn main_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>>;

    fn replica_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>>;
}

impl<P: ConnectionProvider + ?Sized> ConnectionProvider for Arc<P> {
    fn is_replica_available(&self) -> bool {
        (**self).is_replica_available()
    }

    fn main_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>> {
        (**self).main_connection()
    }

    fn replica_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>> {
        (**self).replica_connection()
    }
}

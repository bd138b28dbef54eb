//! TANDEM Test Utilities
//!
//! Centralized test infrastructure for the TANDEM workspace:
//! - Mock connections and connection providers that record every call
//! - Consistency trackers with scripted answers
//! - Scripted progress sources and replica discovery
//! - Proptest generators for SQL text and core types
//! - Custom assertions

pub use tandem_core::{
    ConnectionError, ConnectionProvider, ConsistencyError, ConsistencyTracker, DatabaseConnection,
    DatabaseProgress, Handle, HandleKind, HandleSupplier, IsolationLevel, LogPosition, Reason,
    ReplicaDiscovery, ReplicaNode, TandemError, TandemResult, Warning,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// MOCK CONNECTIONS
// ============================================================================

/// Connection that records every call it receives.
///
/// Operations other than `close` and `warnings` fail once the connection
/// is closed, and any operation can be scripted to fail with [`fail`].
///
/// [`fail`]: MockConnection::fail
#[derive(Debug)]
pub struct MockConnection {
    name: String,
    kind: HandleKind,
    events: Mutex<Vec<String>>,
    warnings: Mutex<Vec<Warning>>,
    failing: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn new(name: impl Into<String>, kind: HandleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            events: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every recorded call, oldest first, e.g. `commit` or `execute(SET x = 1)`.
    pub fn events(&self) -> Vec<String> {
        locked(&self.events).clone()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        locked(&self.events).iter().filter(|e| *e == event).count()
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        locked(&self.events)
            .iter()
            .filter_map(|e| e.strip_prefix("execute(").and_then(|s| s.strip_suffix(')')))
            .map(str::to_string)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn add_warning(&self, warning: Warning) {
        locked(&self.warnings).push(warning);
    }

    /// Make every future call to `operation` fail.
    pub fn fail(&self, operation: &str) {
        locked(&self.failing).push(operation.to_string());
    }

    fn record(&self, operation: &str, event: String) -> TandemResult<()> {
        locked(&self.events).push(event);
        if locked(&self.failing).iter().any(|op| op == operation) {
            return Err(self.failure(operation, "scripted failure"));
        }
        if operation != "close" && self.is_closed() {
            return Err(self.failure(operation, "connection is closed"));
        }
        Ok(())
    }

    fn failure(&self, operation: &str, reason: &str) -> TandemError {
        if operation == "close" {
            return TandemError::from(ConnectionError::CloseFailed {
                kind: self.kind,
                reason: reason.to_string(),
            });
        }
        TandemError::from(ConnectionError::OperationFailed {
            kind: self.kind,
            operation: operation.to_string(),
            reason: format!("{}: {}", self.name, reason),
        })
    }
}

impl DatabaseConnection for MockConnection {
    fn commit(&self) -> TandemResult<()> {
        self.record("commit", "commit".to_string())
    }

    fn rollback(&self) -> TandemResult<()> {
        self.record("rollback", "rollback".to_string())
    }

    fn close(&self) -> TandemResult<()> {
        let result = self.record("close", "close".to_string());
        self.closed.store(true, Ordering::SeqCst);
        result
    }

    fn abort(&self, deadline: Duration) -> TandemResult<()> {
        let result = self.record("abort", format!("abort({}ms)", deadline.as_millis()));
        self.closed.store(true, Ordering::SeqCst);
        result
    }

    fn warnings(&self) -> TandemResult<Vec<Warning>> {
        if locked(&self.failing).iter().any(|op| op == "warnings") {
            return Err(self.failure("warnings", "scripted failure"));
        }
        Ok(locked(&self.warnings).clone())
    }

    fn clear_warnings(&self) -> TandemResult<()> {
        self.record("clear_warnings", "clear_warnings".to_string())?;
        locked(&self.warnings).clear();
        Ok(())
    }

    fn set_auto_commit(&self, auto_commit: bool) -> TandemResult<()> {
        self.record("set_auto_commit", format!("set_auto_commit({})", auto_commit))
    }

    fn set_read_only(&self, read_only: bool) -> TandemResult<()> {
        self.record("set_read_only", format!("set_read_only({})", read_only))
    }

    fn set_transaction_isolation(&self, level: IsolationLevel) -> TandemResult<()> {
        self.record(
            "set_transaction_isolation",
            format!("set_transaction_isolation({:?})", level),
        )
    }

    fn execute(&self, sql: &str) -> TandemResult<()> {
        self.record("execute", format!("execute({})", sql))
    }
}

/// Provider handing out a fresh [`MockConnection`] per request.
#[derive(Debug)]
pub struct MockConnectionProvider {
    replica_available: AtomicBool,
    fail_main: AtomicBool,
    fail_replica: AtomicBool,
    shared: Option<Arc<MockConnection>>,
    mains: Mutex<Vec<Arc<MockConnection>>>,
    replicas: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionProvider {
    pub fn new() -> Self {
        Self {
            replica_available: AtomicBool::new(true),
            fail_main: AtomicBool::new(false),
            fail_replica: AtomicBool::new(false),
            shared: None,
            mains: Mutex::new(Vec::new()),
            replicas: Mutex::new(Vec::new()),
        }
    }

    /// Provider reporting that no replica exists.
    pub fn without_replica() -> Self {
        let provider = Self::new();
        provider.set_replica_available(false);
        provider
    }

    /// Provider returning one and the same connection for main and replica.
    pub fn shared_connection() -> Self {
        Self {
            shared: Some(Arc::new(MockConnection::new("shared", HandleKind::Main))),
            ..Self::new()
        }
    }

    pub fn set_replica_available(&self, available: bool) {
        self.replica_available.store(available, Ordering::SeqCst);
    }

    pub fn fail_main_connections(&self, fail: bool) {
        self.fail_main.store(fail, Ordering::SeqCst);
    }

    pub fn fail_replica_connections(&self, fail: bool) {
        self.fail_replica.store(fail, Ordering::SeqCst);
    }

    /// Every main connection handed out so far.
    pub fn mains(&self) -> Vec<Arc<MockConnection>> {
        locked(&self.mains).clone()
    }

    /// Every replica connection handed out so far.
    pub fn replicas(&self) -> Vec<Arc<MockConnection>> {
        locked(&self.replicas).clone()
    }

    pub fn last_main(&self) -> Option<Arc<MockConnection>> {
        locked(&self.mains).last().cloned()
    }

    pub fn last_replica(&self) -> Option<Arc<MockConnection>> {
        locked(&self.replicas).last().cloned()
    }

    fn open(
        &self,
        kind: HandleKind,
        fail: &AtomicBool,
        opened: &Mutex<Vec<Arc<MockConnection>>>,
    ) -> TandemResult<Arc<dyn DatabaseConnection>> {
        if fail.load(Ordering::SeqCst) {
            return Err(TandemError::from(ConnectionError::HandleCreationFailed {
                kind,
                reason: "connection refused".to_string(),
            }));
        }
        let mut opened = locked(opened);
        let connection = match &self.shared {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(MockConnection::new(
                format!("{}-{}", kind, opened.len() + 1),
                kind,
            )),
        };
        opened.push(Arc::clone(&connection));
        Ok(connection)
    }
}

impl Default for MockConnectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionProvider for MockConnectionProvider {
    fn is_replica_available(&self) -> bool {
        self.replica_available.load(Ordering::SeqCst)
    }

    fn main_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>> {
        self.open(HandleKind::Main, &self.fail_main, &self.mains)
    }

    fn replica_connection(&self) -> TandemResult<Arc<dyn DatabaseConnection>> {
        self.open(HandleKind::Replica, &self.fail_replica, &self.replicas)
    }
}

// ============================================================================
// MOCK CONSISTENCY
// ============================================================================

/// Tracker with a switchable answer that counts the calls it receives.
#[derive(Debug)]
pub struct SwitchableConsistency {
    consistent: AtomicBool,
    touch_replica: bool,
    writes: AtomicUsize,
    pre_commits: AtomicUsize,
    checks: AtomicUsize,
}

impl SwitchableConsistency {
    pub fn new(consistent: bool) -> Self {
        Self {
            consistent: AtomicBool::new(consistent),
            touch_replica: false,
            writes: AtomicUsize::new(0),
            pre_commits: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
        }
    }

    /// Always consistent, never looks at the replica.
    pub fn consistent() -> Self {
        Self::new(true)
    }

    /// Never consistent, never looks at the replica.
    pub fn inconsistent() -> Self {
        Self::new(false)
    }

    /// Materialize the replica through the supplier on every check, and
    /// answer "inconsistent" when that fails.
    pub fn touching_replica(mut self) -> Self {
        self.touch_replica = true;
        self
    }

    pub fn set_consistent(&self, consistent: bool) {
        self.consistent.store(consistent, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn pre_commits(&self) -> usize {
        self.pre_commits.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl ConsistencyTracker for SwitchableConsistency {
    fn write(&self, _main: &Handle) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn pre_commit(&self, _main: &Handle) {
        self.pre_commits.fetch_add(1, Ordering::SeqCst);
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.touch_replica && replica.handle().is_err() {
            return false;
        }
        self.consistent.load(Ordering::SeqCst)
    }
}

/// Tracker cycling through a scripted list of answers.
#[derive(Debug)]
pub struct CircularConsistency {
    answers: Vec<bool>,
    touch_replica: bool,
    next: AtomicUsize,
}

impl CircularConsistency {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers,
            touch_replica: false,
            next: AtomicUsize::new(0),
        }
    }

    /// Materialize the replica through the supplier on every check.
    pub fn touching_replica(mut self) -> Self {
        self.touch_replica = true;
        self
    }
}

impl ConsistencyTracker for CircularConsistency {
    fn write(&self, _main: &Handle) {}

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        if self.answers.is_empty() {
            return false;
        }
        if self.touch_replica && replica.handle().is_err() {
            return false;
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.answers[index % self.answers.len()]
    }
}

// ============================================================================
// MOCK PROGRESS AND DISCOVERY
// ============================================================================

/// Progress source returning scripted positions; `None` means the query fails.
#[derive(Debug)]
pub struct ScriptedProgress<T> {
    main: Mutex<Option<T>>,
    replica: Mutex<Option<T>>,
    main_queries: AtomicUsize,
    replica_queries: AtomicUsize,
}

impl<T: Clone> ScriptedProgress<T> {
    pub fn new(main: Option<T>, replica: Option<T>) -> Self {
        Self {
            main: Mutex::new(main),
            replica: Mutex::new(replica),
            main_queries: AtomicUsize::new(0),
            replica_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_main(&self, progress: Option<T>) {
        *locked(&self.main) = progress;
    }

    pub fn set_replica(&self, progress: Option<T>) {
        *locked(&self.replica) = progress;
    }

    pub fn main_queries(&self) -> usize {
        self.main_queries.load(Ordering::SeqCst)
    }

    pub fn replica_queries(&self) -> usize {
        self.replica_queries.load(Ordering::SeqCst)
    }

    fn answer(slot: &Mutex<Option<T>>, kind: HandleKind) -> TandemResult<T> {
        locked(slot).clone().ok_or_else(|| {
            TandemError::from(ConsistencyError::ProgressQueryFailed {
                kind,
                reason: "scripted failure".to_string(),
            })
        })
    }
}

impl<T: Clone + Send> DatabaseProgress<T> for ScriptedProgress<T> {
    fn fetch_main_progress(&self, _main: &Handle) -> TandemResult<T> {
        self.main_queries.fetch_add(1, Ordering::SeqCst);
        Self::answer(&self.main, HandleKind::Main)
    }

    fn fetch_replica_progress(&self, _replica: &Handle) -> TandemResult<T> {
        self.replica_queries.fetch_add(1, Ordering::SeqCst);
        Self::answer(&self.replica, HandleKind::Replica)
    }
}

/// A set of replica nodes backed by mock connections.
#[derive(Debug, Clone)]
pub struct MockCluster {
    nodes: Vec<ReplicaNode>,
    opened: Arc<Mutex<Vec<Arc<MockConnection>>>>,
}

impl MockCluster {
    pub fn with_nodes(count: usize) -> Self {
        let opened: Arc<Mutex<Vec<Arc<MockConnection>>>> = Arc::new(Mutex::new(Vec::new()));
        let nodes = (0..count)
            .map(|i| {
                let id = format!("replica-node-{}", i + 1);
                let opened = Arc::clone(&opened);
                let name = id.clone();
                ReplicaNode::new(id, move || {
                    let connection = Arc::new(MockConnection::new(name.clone(), HandleKind::Replica));
                    locked(&opened).push(Arc::clone(&connection));
                    Ok(Handle::replica(connection))
                })
            })
            .collect();
        Self { nodes, opened }
    }

    pub fn nodes(&self) -> Vec<ReplicaNode> {
        self.nodes.clone()
    }

    /// Connections opened to any node so far.
    pub fn opened(&self) -> Vec<Arc<MockConnection>> {
        locked(&self.opened).clone()
    }
}

/// Discovery returning a fixed node list, or failing.
#[derive(Debug)]
pub struct StaticDiscovery {
    nodes: Option<Vec<ReplicaNode>>,
    calls: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<ReplicaNode>) -> Self {
        Self {
            nodes: Some(nodes),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            nodes: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReplicaDiscovery for StaticDiscovery {
    fn list_replica_nodes(&self, _replica: &dyn HandleSupplier) -> TandemResult<Vec<ReplicaNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.nodes.clone().ok_or_else(|| {
            TandemError::from(ConsistencyError::DiscoveryFailed {
                reason: "cluster directory unreachable".to_string(),
            })
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SQL text and core types.

    use super::*;
    use proptest::prelude::*;

    /// Lowercase identifier.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Plain `SELECT` without function calls or locking clauses.
    pub fn arb_read_sql() -> impl Strategy<Value = String> {
        (arb_identifier(), arb_identifier(), 0i64..1_000_000).prop_map(|(column, table, id)| {
            format!("SELECT {} FROM {} WHERE id = {}", column, table, id)
        })
    }

    /// `UPDATE` or `DELETE` in random case with leading whitespace.
    pub fn arb_write_sql() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("UPDATE"), Just("update"), Just("Delete"), Just("DELETE")],
            arb_identifier(),
            " {0,3}",
        )
            .prop_map(|(verb, table, indent)| {
                if verb.eq_ignore_ascii_case("update") {
                    format!("{}{} {} SET x = 1", indent, verb, table)
                } else {
                    format!("{}{} FROM {}", indent, verb, table)
                }
            })
    }

    pub fn arb_log_position() -> impl Strategy<Value = LogPosition> {
        any::<u64>().prop_map(LogPosition)
    }

    pub fn arb_isolation_level() -> impl Strategy<Value = IsolationLevel> {
        prop_oneof![
            Just(IsolationLevel::None),
            Just(IsolationLevel::ReadUncommitted),
            Just(IsolationLevel::ReadCommitted),
            Just(IsolationLevel::RepeatableRead),
            Just(IsolationLevel::Serializable),
        ]
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for routing outcomes.

    use super::*;

    /// Assert a handle points at the expected database.
    pub fn assert_kind(handle: &Handle, kind: HandleKind) {
        assert_eq!(handle.kind(), kind, "Expected a {} handle", kind);
    }

    /// Assert a handle wraps exactly this mock connection.
    pub fn assert_wraps(handle: &Handle, connection: &Arc<MockConnection>) {
        let expected: Arc<dyn DatabaseConnection> = Arc::clone(connection) as _;
        assert!(
            handle.same_connection(&Handle::new(handle.kind(), expected)),
            "Handle does not wrap {}",
            connection.name()
        );
    }

    /// Assert every connection in the list has been closed.
    pub fn assert_all_closed(connections: &[Arc<MockConnection>]) {
        for connection in connections {
            assert!(connection.is_closed(), "{} was left open", connection.name());
        }
    }
}

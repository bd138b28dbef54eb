//! Sessions routed by real consistency trackers.
//!
//! Each test shares one tracker between a writing session and a reading
//! session, the way an application shares a tracker across its pool.

use std::sync::Arc;
use std::time::Duration;
use tandem_cache::{SuppliedCache, TimedSingleFlightCache};
use tandem_consistency::{
    ClockConsistency, ClusterConsistency, LogPositionConsistency, LoggingConsistency,
    ProgressCachingConsistency, PropagationConsistency,
};
use tandem_core::{Clock, ConsistencyTracker, ManualClock, RouteDecisionBuilder, TandemConfig};
use tandem_router::{CircuitBreaker, SessionState, SqlClassifier, State};
use tandem_test_utils::assertions::{assert_all_closed, assert_kind};
use tandem_test_utils::{
    CircularConsistency, HandleKind, LogPosition, MockCluster, MockConnectionProvider,
    ReplicaNode, ScriptedProgress, StaticDiscovery,
};

#[path = "support/tracing.rs"]
mod tracing_support;

fn session(provider: &Arc<MockConnectionProvider>, tracker: Arc<dyn ConsistencyTracker>) -> SessionState {
    tracing_support::init_test_tracing();
    SessionState::standard(
        provider.clone(),
        tracker,
        SqlClassifier::default(),
        Arc::new(CircuitBreaker::new()),
    )
}

fn write_and_record(session: &mut SessionState) {
    session
        .write_handle(RouteDecisionBuilder::write("UPDATE accounts SET balance = 0"))
        .unwrap();
    session.record_write();
}

#[test]
fn test_log_position_end_to_end() {
    let progress = Arc::new(ScriptedProgress::new(
        Some(LogPosition(100)),
        Some(LogPosition(99)),
    ));
    let tracker = Arc::new(LogPositionConsistency::<LogPosition>::new(progress.clone()));
    let provider = Arc::new(MockConnectionProvider::new());

    let mut writer = session(&provider, tracker.clone());
    write_and_record(&mut writer);
    assert_eq!(tracker.last_write(), Some(LogPosition(100)));

    let mut reader = session(&provider, tracker.clone());
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Main);
    assert_eq!(reader.state(), State::CommittedMain);

    progress.set_replica(Some(LogPosition(100)));
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);
    assert_eq!(reader.state(), State::Replica);

    // the replica opened for the failed check was closed when main took over
    let replicas = provider.replicas();
    assert_eq!(replicas.len(), 2);
    assert!(replicas[0].is_closed());
    assert!(!replicas[1].is_closed());
}

#[test]
fn test_clock_lag_end_to_end() {
    let clock = Arc::new(ManualClock::at_epoch());
    let tracker = Arc::new(ClockConsistency::new(clock.clone(), Duration::from_millis(100)));
    let provider = Arc::new(MockConnectionProvider::new());

    clock.advance(Duration::from_secs(1));
    let mut writer = session(&provider, tracker.clone());
    write_and_record(&mut writer);
    assert_eq!(tracker.last_write(), Some(clock.now()));

    let mut reader = session(&provider, tracker.clone());
    clock.advance(Duration::from_millis(99));
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Main);

    clock.advance(Duration::from_millis(2));
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);
}

#[test]
fn test_manual_commit_records_write_on_commit() {
    let progress = Arc::new(ScriptedProgress::new(Some(7u64), Some(7u64)));
    let tracker = Arc::new(
        ProgressCachingConsistency::<u64>::builder(progress.clone()).build(),
    );
    let provider = Arc::new(MockConnectionProvider::new());

    let mut writer = session(&provider, tracker.clone());
    writer.set_auto_commit(false).unwrap();
    write_and_record(&mut writer);
    assert_eq!(progress.main_queries(), 0);

    writer.commit().unwrap();
    assert_eq!(progress.main_queries(), 1);

    let mut reader = session(&provider, tracker);
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);
}

#[test]
fn test_cluster_of_three_needs_every_node() {
    let cluster = MockCluster::with_nodes(3);
    let discovery = Arc::new(StaticDiscovery::new(cluster.nodes()));
    let nodes: Arc<dyn SuppliedCache<Vec<ReplicaNode>>> = Arc::new(
        TimedSingleFlightCache::<Vec<ReplicaNode>>::builder(Duration::from_secs(5)).build(),
    );
    let tracker = Arc::new(LoggingConsistency::new(
        "cluster",
        Arc::new(
            ClusterConsistency::new(
                Arc::new(
                    CircularConsistency::new(vec![true, true, false, true, true, true])
                        .touching_replica(),
                ),
                discovery.clone(),
            )
            .with_discovery_cache(nodes),
        ),
    ));
    let provider = Arc::new(MockConnectionProvider::new());
    let mut reader = session(&provider, tracker);

    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Main);

    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);

    assert_eq!(cluster.opened().len(), 6);
    assert_all_closed(&cluster.opened());
    assert_eq!(discovery.calls(), 2);
}

#[test]
fn test_empty_cluster_reads_from_main() {
    let discovery = Arc::new(StaticDiscovery::new(Vec::new()));
    let tracker = Arc::new(ClusterConsistency::new(
        Arc::new(CircularConsistency::new(vec![true])),
        discovery.clone(),
    ));
    let provider = Arc::new(MockConnectionProvider::new());
    let mut reader = session(&provider, tracker);

    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Main);
    assert_eq!(reader.state(), State::CommittedMain);
    assert_eq!(discovery.calls(), 1);
}

#[test]
fn test_trackers_and_caches_built_from_config() {
    let mut config = TandemConfig::default();
    config.consistency.clock_lag = Duration::from_millis(300);
    config.consistency.max_propagation = Duration::from_millis(750);
    config.consistency.refresh_timeout = Duration::from_secs(1);
    config.consistency.fall_back_to_consistency = true;
    config.validate().unwrap();

    let clock = Arc::new(ManualClock::at_epoch());
    let provider = Arc::new(MockConnectionProvider::new());

    let progress = Arc::new(ScriptedProgress::new(Some(3u64), Some(3u64)));
    let replica_progress: Arc<dyn SuppliedCache<u64>> = Arc::new(
        TimedSingleFlightCache::<u64>::from_config(&config.consistency)
            .clock(clock.clone())
            .sequence_values()
            .build(),
    );
    let caching = Arc::new(
        ProgressCachingConsistency::<u64>::builder(progress.clone())
            .last_replica(replica_progress.clone())
            .with_config(&config.consistency)
            .build(),
    );

    // no write recorded yet, the configured fallback allows the replica
    let mut reader = session(&provider, caching.clone());
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);
    assert_eq!(progress.replica_queries(), 0);

    let mut writer = session(&provider, caching);
    write_and_record(&mut writer);
    let handle = reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);
    assert_eq!(progress.replica_queries(), 1);
    assert_eq!(replica_progress.last(), Some(3));

    let lagging = Arc::new(ClockConsistency::from_config(clock.clone(), &config.consistency));
    let mut lag_reader = session(&provider, lagging);
    clock.advance(Duration::from_millis(250));
    let handle = lag_reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Main);
    clock.advance(Duration::from_millis(51));
    let handle = lag_reader.read_handle(RouteDecisionBuilder::read("SELECT 1")).unwrap();
    assert_kind(&handle, HandleKind::Replica);

    let propagation = PropagationConsistency::builder()
        .with_config(&config.consistency)
        .measure_time(clock)
        .build();
    assert_eq!(propagation.max_propagation(), Duration::from_millis(750));
}

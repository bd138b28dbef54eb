//! TANDEM Consistency - "has the replica caught up?"
//!
//! Every strategy implements [`ConsistencyTracker`]: it is told about
//! writes on main and asked whether a replica would observe them.
//!
//! | Strategy | Knows about the replica through |
//! |----------|---------------------------------|
//! | [`ClockConsistency`] | an assumed fixed lag |
//! | [`PropagationConsistency`] | an assumed max propagation time, pessimistic when unsure |
//! | [`LogPositionConsistency`] | log positions queried on both sides |
//! | [`ProgressCachingConsistency`] | cached progress on both sides, with a fallback answer |
//! | [`ClusterConsistency`] | every discovered replica node |
//!
//! [`LoggingConsistency`] wraps any of them and traces each call.
//!
//! Failures inside a tracker are logged at `warn` and answered with
//! "inconsistent".

pub mod clock;
pub mod cluster;
pub mod log_position;
pub mod logging;
pub mod progress_caching;
pub mod propagation;

pub use clock::ClockConsistency;
pub use cluster::ClusterConsistency;
pub use log_position::LogPositionConsistency;
pub use logging::LoggingConsistency;
pub use progress_caching::{ProgressCachingConsistency, ProgressCachingConsistencyBuilder};
pub use propagation::{PropagationConsistency, PropagationConsistencyBuilder};
pub use tandem_core::ConsistencyTracker;

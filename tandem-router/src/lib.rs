//! TANDEM Router - Main/Replica Session Routing
//!
//! Decides, operation by operation, whether a database session should use
//! the main database or a read replica:
//!
//! - [`SqlClassifier`] recognises writes, row locks and `SET` statements
//! - [`Chief`]s can force an operation to main; [`ChainOfChiefs`] runs them
//! - [`SessionState`] holds the session's handles and its routing state
//! - [`CircuitBreaker`] sends everything to main once a replica turns out
//!   not to support an operation
//!
//! Consistency trackers live in `tandem-consistency`; the router only sees
//! them through [`tandem_core::ConsistencyTracker`].

pub mod breaker;
pub mod chief;
pub mod classifier;
pub mod session;

pub use breaker::{BreakerState, CircuitBreaker};
pub use chief::{BreakerChief, ChainOfChiefs, Chief, ConsistencyGuardingChief, WriteDetectingChief};
pub use classifier::SqlClassifier;
pub use session::{
    HandleSlot, NoOpStateListener, SessionParameters, SessionState, State, StateListener, Warnings,
    MAX_WARNINGS,
};

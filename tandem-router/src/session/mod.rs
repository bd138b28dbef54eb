//! Per-session routing state.
//!
//! A [`SessionState`] owns at most one main handle and one replica handle
//! and decides, operation by operation, which of them to use:
//!
//! | State            | Holds   | Next read goes to                         |
//! |------------------|---------|-------------------------------------------|
//! | `NotInitialised` | nothing | replica, unless the chain forces main     |
//! | `Replica`        | replica | replica, unless the chain forces main     |
//! | `Main`           | main    | main, always                              |
//! | `CommittedMain`  | main    | replica again once it has caught up       |
//! | `Closed`         | nothing | nowhere                                   |

mod listener;
mod parameters;
mod slot;
mod state;
mod warnings;

pub use listener::{NoOpStateListener, StateListener};
pub use parameters::SessionParameters;
pub use slot::HandleSlot;
pub use state::State;
pub use warnings::{Warnings, MAX_WARNINGS};

use crate::breaker::CircuitBreaker;
use crate::chief::{ChainOfChiefs, Chief};
use crate::classifier::SqlClassifier;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    new_session_id, ConnectionError, ConnectionProvider, ConsistencyTracker, Handle, HandleKind,
    IsolationLevel, Reason, RouteDecision, RouteDecisionBuilder, SessionId, TandemError,
    TandemResult, Warning,
};
use tracing::{debug, warn};

/// Routing state of one logical database session.
pub struct SessionState {
    id: SessionId,
    provider: Arc<dyn ConnectionProvider>,
    tracker: Arc<dyn ConsistencyTracker>,
    chain: ChainOfChiefs,
    listener: Arc<dyn StateListener>,
    parameters: SessionParameters,
    warnings: Warnings,
    main: HandleSlot,
    replica: HandleSlot,
    /// Main is held only because the replica could not serve reads.
    committed: bool,
    closed: bool,
    last_decision: Option<RouteDecision>,
}

impl SessionState {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        tracker: Arc<dyn ConsistencyTracker>,
        chain: ChainOfChiefs,
    ) -> Self {
        Self {
            id: new_session_id(),
            provider,
            tracker,
            chain,
            listener: Arc::new(NoOpStateListener),
            parameters: SessionParameters::new(),
            warnings: Warnings::new(),
            main: HandleSlot::Absent,
            replica: HandleSlot::Absent,
            committed: false,
            closed: false,
            last_decision: None,
        }
    }

    /// Session routed by the standard chain.
    ///
    /// `breaker` is the one callers guard replica operations with; once it
    /// opens, every later operation of this session goes to main.
    pub fn standard(
        provider: Arc<dyn ConnectionProvider>,
        tracker: Arc<dyn ConsistencyTracker>,
        classifier: SqlClassifier,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let chain = ChainOfChiefs::standard(classifier, tracker.clone(), breaker);
        Self::new(provider, tracker, chain)
    }

    pub fn with_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> State {
        if self.closed {
            State::Closed
        } else if !self.main.is_ready() && !self.replica.is_ready() {
            State::NotInitialised
        } else if self.main.is_ready() && self.committed {
            State::CommittedMain
        } else if self.main.is_ready() {
            State::Main
        } else {
            State::Replica
        }
    }

    pub fn parameters(&self) -> &SessionParameters {
        &self.parameters
    }

    /// The decision that pinned the session to main, while it is pinned.
    pub fn causing_decision(&self) -> Option<RouteDecision> {
        if self.state() == State::Main {
            self.main.decision().cloned()
        } else {
            None
        }
    }

    /// Final decision of the latest successful read or write routing.
    pub fn last_decision(&self) -> Option<&RouteDecision> {
        self.last_decision.as_ref()
    }

    /// The handle operations without a statement should use.
    pub fn current_handle(&self) -> Option<Handle> {
        match self.state() {
            State::Replica => self.replica.handle().cloned(),
            state if state.holds_main() => self.main.handle().cloned(),
            _ => None,
        }
    }

    /// Handle for a read, on a replica whenever that is safe.
    pub fn read_handle(&mut self, mut decision: RouteDecisionBuilder) -> TandemResult<Handle> {
        self.ensure_open()?;
        let before = self.state();
        let result = self.prepare_read(&mut decision);
        self.finish(before, &decision, &result);
        result
    }

    /// Handle for a write, always on main. Pins the session to main.
    pub fn write_handle(&mut self, mut decision: RouteDecisionBuilder) -> TandemResult<Handle> {
        self.ensure_open()?;
        let before = self.state();
        let result = self.prepare_write(&mut decision);
        self.finish(before, &decision, &result);
        result
    }

    /// Tell the tracker about a write executed in auto-commit mode.
    pub fn record_write(&self) {
        if !self.parameters.is_auto_commit() || self.state() != State::Main {
            return;
        }
        if let Some(main) = self.main.handle() {
            self.tracker.write(main);
        }
    }

    pub fn commit(&mut self) -> TandemResult<()> {
        self.ensure_open()?;
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        let pinned = self.state() == State::Main;
        if pinned {
            self.tracker.pre_commit(&handle);
        }
        handle.commit()?;
        if pinned && !self.parameters.is_auto_commit() {
            self.tracker.write(&handle);
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> TandemResult<()> {
        self.ensure_open()?;
        match self.current_handle() {
            Some(handle) => handle.rollback(),
            None => Ok(()),
        }
    }

    /// Switching from manual commit to auto-commit commits implicitly, which
    /// counts as a write while the session is pinned to main.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> TandemResult<()> {
        self.ensure_open()?;
        let before = self.parameters.is_auto_commit();
        let current = self.current_handle();
        self.parameters.set_auto_commit(current.as_ref(), auto_commit)?;
        if !before && auto_commit && self.state() == State::Main {
            if let Some(main) = self.main.handle() {
                self.tracker.write(main);
            }
        }
        Ok(())
    }

    pub fn set_read_only(&mut self, read_only: bool) -> TandemResult<()> {
        self.ensure_open()?;
        let current = self.current_handle();
        self.parameters.set_read_only(current.as_ref(), read_only)
    }

    /// Isolation stricter than read-committed sends later reads to main.
    pub fn set_transaction_isolation(&mut self, level: IsolationLevel) -> TandemResult<()> {
        self.ensure_open()?;
        let current = self.current_handle();
        self.parameters.set_transaction_isolation(current.as_ref(), level)
    }

    /// Run a session parameter statement on every open handle and replay
    /// it on handles opened later. Callers recognise such statements with
    /// [`SqlClassifier::is_set_statement`].
    pub fn apply_set_statement(&mut self, sql: &str) -> TandemResult<()> {
        self.ensure_open()?;
        for handle in [self.main.handle(), self.replica.handle()].into_iter().flatten() {
            handle.execute(sql)?;
        }
        self.parameters.add_set_statement(sql);
        Ok(())
    }

    /// Warnings of handles closed so far plus those of the current handle.
    pub fn warnings(&mut self) -> TandemResult<Vec<Warning>> {
        self.ensure_open()?;
        if let Some(handle) = self.current_handle() {
            self.warnings.save_all(handle.warnings()?);
        }
        Ok(self.warnings.as_slice().to_vec())
    }

    pub fn clear_warnings(&mut self) -> TandemResult<()> {
        self.ensure_open()?;
        if let Some(handle) = self.current_handle() {
            handle.clear_warnings()?;
        }
        self.warnings.clear();
        Ok(())
    }

    /// Close every open handle. All handles are closed even when one fails;
    /// the first failure is returned. Closing twice is a no-op.
    pub fn close(&mut self) -> TandemResult<()> {
        if self.closed {
            return Ok(());
        }
        let before = self.state();
        self.closed = true;
        let main = self.close_slot(HandleKind::Main);
        let replica = self.close_slot(HandleKind::Replica);
        self.notify(before);
        main.and(replica)
    }

    /// Abort every open handle, waiting at most `deadline` for each.
    pub fn abort(&mut self, deadline: Duration) -> TandemResult<()> {
        if self.closed {
            return Ok(());
        }
        let before = self.state();
        self.closed = true;
        let main = self.main.take().map_or(Ok(()), |handle| handle.abort(deadline));
        let replica = self.replica.take().map_or(Ok(()), |handle| handle.abort(deadline));
        self.notify(before);
        main.and(replica)
    }

    fn ensure_open(&self) -> TandemResult<()> {
        if self.closed {
            return Err(TandemError::from(ConnectionError::SessionClosed {
                session: self.id.to_string(),
            }));
        }
        Ok(())
    }

    fn prepare_read(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<Handle> {
        if self
            .parameters
            .transaction_isolation()
            .is_some_and(IsolationLevel::exceeds_read_committed)
        {
            decision.set_reason(Reason::HighIsolationLevel);
            return self.prepare_main(decision);
        }
        if self.state() == State::Main {
            if let Some(cause) = self.main.decision() {
                decision.set_cause(cause.root_cause().clone());
            }
            decision.set_reason(Reason::MainReuse);
            return self.prepare_main(decision);
        }
        if !self.provider.is_replica_available() {
            self.chain.override_decision(decision, &[]);
            if !decision.will_run_on_main() {
                decision.set_reason(Reason::ReplicaUnavailable);
            }
            return self.route_to_main(decision);
        }

        self.consult_chain(decision)?;
        if decision.will_run_on_main() {
            return self.route_to_main(decision);
        }
        if self.state() == State::CommittedMain {
            self.close_slot(HandleKind::Main)?;
        }
        self.committed = false;
        self.prepare_replica(decision)
    }

    /// Run the chain with a replica that is only opened if a chief asks for
    /// it. A replica opened that way is kept for the session.
    fn consult_chain(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<()> {
        let opened: RefCell<Option<Handle>> = RefCell::new(self.replica.handle().cloned());
        let provider = &self.provider;
        let replica = || -> TandemResult<Handle> {
            let existing = opened.borrow().clone();
            if let Some(handle) = existing {
                return Ok(handle);
            }
            let handle = Handle::replica(provider.replica_connection()?);
            *opened.borrow_mut() = Some(handle.clone());
            Ok(handle)
        };
        self.chain.override_decision(decision, &[&replica]);

        if self.replica.is_ready() {
            return Ok(());
        }
        if let Some(handle) = opened.into_inner() {
            self.replica.install(handle.clone(), decision.build());
            self.parameters.initialize(&handle)?;
        }
        Ok(())
    }

    fn route_to_main(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<Handle> {
        if decision.reason().pins_main() {
            return self.prepare_write(decision);
        }
        self.committed = true;
        self.prepare_main(decision)
    }

    fn prepare_write(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<Handle> {
        self.committed = false;
        let handle = self.prepare_main(decision)?;
        if let HandleSlot::Ready { decision: cause, .. } = &mut self.main {
            if !cause.reason().pins_main() && decision.reason().pins_main() {
                *cause = decision.build();
            }
        }
        Ok(handle)
    }

    fn prepare_main(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<Handle> {
        if let Some(handle) = self.main.handle().cloned() {
            self.release_replica(&handle)?;
            return Ok(handle);
        }
        let handle = Handle::main(self.provider.main_connection()?);
        self.main.install(handle.clone(), decision.build());
        debug!(session_id = %self.id, reason = %decision.reason(), "opened main handle");

        self.release_replica(&handle)?;
        self.parameters.initialize(&handle)?;
        Ok(handle)
    }

    /// Drop the replica once main is held. A replica that is really the
    /// main connection is forgotten, not closed.
    fn release_replica(&mut self, main: &Handle) -> TandemResult<()> {
        let shares_connection = self
            .replica
            .handle()
            .is_some_and(|replica| replica.same_connection(main));
        if shares_connection {
            self.replica = HandleSlot::Absent;
            return Ok(());
        }
        self.close_slot(HandleKind::Replica)
    }

    fn prepare_replica(&mut self, decision: &mut RouteDecisionBuilder) -> TandemResult<Handle> {
        let provider = &self.provider;
        let (handle, created) = self.replica.get_or_create(
            || decision.build(),
            || Ok(Handle::replica(provider.replica_connection()?)),
        )?;
        if created {
            debug!(session_id = %self.id, "opened replica handle");
            self.parameters.initialize(&handle)?;
        }
        Ok(handle)
    }

    /// Close a slot's handle, saving its warnings first. The slot is
    /// emptied whether or not closing succeeds.
    fn close_slot(&mut self, kind: HandleKind) -> TandemResult<()> {
        let slot = match kind {
            HandleKind::Main => &mut self.main,
            HandleKind::Replica => &mut self.replica,
        };
        let Some(handle) = slot.take() else {
            return Ok(());
        };
        match handle.warnings() {
            Ok(warnings) => self.warnings.save_all(warnings),
            Err(e) => self.warnings.save(Warning::new(e.to_string())),
        }
        handle.close().inspect_err(|e| {
            warn!(session_id = %self.id, kind = %kind, error = %e, "failed to close handle");
        })
    }

    fn finish(&mut self, before: State, decision: &RouteDecisionBuilder, result: &TandemResult<Handle>) {
        match result {
            Ok(handle) => {
                debug!(
                    session_id = %self.id,
                    reason = %decision.reason(),
                    kind = %handle.kind(),
                    "routed operation"
                );
                self.last_decision = Some(decision.build());
            }
            Err(e) => {
                debug!(session_id = %self.id, reason = %decision.reason(), error = %e, "routing failed");
            }
        }
        self.notify(before);
    }

    fn notify(&self, before: State) {
        let after = self.state();
        if after != before {
            debug!(session_id = %self.id, from = %before, to = %after, "session state transition");
            self.listener.transition(before, after);
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("parameters", &self.parameters)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

use tandem_core::{Handle, RouteDecision, TandemResult};

/// Lifecycle of one of the two handles a session may hold.
///
/// A ready slot remembers the decision that created its handle, which is
/// how a session explains later main reuse.
#[derive(Debug, Default)]
pub enum HandleSlot {
    #[default]
    Absent,
    Ready { handle: Handle, decision: RouteDecision },
}

impl HandleSlot {
    pub fn is_ready(&self) -> bool {
        matches!(self, HandleSlot::Ready { .. })
    }

    pub fn handle(&self) -> Option<&Handle> {
        match self {
            HandleSlot::Ready { handle, .. } => Some(handle),
            HandleSlot::Absent => None,
        }
    }

    pub fn decision(&self) -> Option<&RouteDecision> {
        match self {
            HandleSlot::Ready { decision, .. } => Some(decision),
            HandleSlot::Absent => None,
        }
    }

    /// Return the held handle, or create one and remember `decision`.
    ///
    /// The second value is true when the handle was just created. A failed
    /// creation leaves the slot absent.
    pub fn get_or_create(
        &mut self,
        decision: impl FnOnce() -> RouteDecision,
        create: impl FnOnce() -> TandemResult<Handle>,
    ) -> TandemResult<(Handle, bool)> {
        if let HandleSlot::Ready { handle, .. } = self {
            return Ok((handle.clone(), false));
        }
        let handle = create()?;
        *self = HandleSlot::Ready {
            handle: handle.clone(),
            decision: decision(),
        };
        Ok((handle, true))
    }

    /// Install an already created handle unless one is held.
    pub fn install(&mut self, handle: Handle, decision: RouteDecision) {
        if !self.is_ready() {
            *self = HandleSlot::Ready { handle, decision };
        }
    }

    pub fn take(&mut self) -> Option<Handle> {
        match std::mem::take(self) {
            HandleSlot::Ready { handle, .. } => Some(handle),
            HandleSlot::Absent => None,
        }
    }
}

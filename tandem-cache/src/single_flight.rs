//! Refresh-on-read cache with at most one refresh in flight.

use crate::SuppliedCache;
use std::sync::{Mutex, RwLock, TryLockError};
use tandem_core::TandemResult;

/// Every read may refresh the value, but only one caller at a time does.
///
/// Callers that lose the race do not wait for the refresh; they get the
/// last stored value, which may be absent. A refresh that never returns
/// blocks all later refreshes; use
/// [`TimedSingleFlightCache`](crate::TimedSingleFlightCache) when suppliers
/// can hang.
#[derive(Debug)]
pub struct SingleFlightCache<T> {
    refresh: Mutex<()>,
    value: RwLock<Option<T>>,
}

impl<T> SingleFlightCache<T> {
    pub fn new() -> Self {
        Self {
            refresh: Mutex::new(()),
            value: RwLock::new(None),
        }
    }
}

impl<T> Default for SingleFlightCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> SuppliedCache<T> for SingleFlightCache<T> {
    fn get(&self, supplier: &mut dyn FnMut() -> TandemResult<T>) -> TandemResult<Option<T>> {
        let _flight = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(self.last()),
        };

        let fresh = supplier()?;
        let mut value = self.value.write().unwrap_or_else(|e| e.into_inner());
        *value = Some(fresh);
        Ok(value.clone())
    }

    fn last(&self) -> Option<T> {
        self.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

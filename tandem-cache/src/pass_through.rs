use crate::SuppliedCache;
use std::marker::PhantomData;
use tandem_core::TandemResult;

/// Calls the supplier on every read and remembers nothing.
#[derive(Debug)]
pub struct PassThroughCache<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> PassThroughCache<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for PassThroughCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SuppliedCache<T> for PassThroughCache<T> {
    fn get(&self, supplier: &mut dyn FnMut() -> TandemResult<T>) -> TandemResult<Option<T>> {
        supplier().map(Some)
    }

    fn last(&self) -> Option<T> {
        None
    }
}

//! Cache contracts.

use std::sync::Arc;
use tandem_core::TandemResult;

/// A value slot written explicitly.
pub trait Cache<T>: Send + Sync {
    fn get(&self) -> Option<T>;

    fn put(&self, value: T);

    fn reset(&self);
}

/// A value slot refreshed through a supplier.
pub trait SuppliedCache<T>: Send + Sync {
    /// Possibly refresh through `supplier`, then return the cached value.
    ///
    /// Supplier errors propagate; the previous value is kept.
    fn get(&self, supplier: &mut dyn FnMut() -> TandemResult<T>) -> TandemResult<Option<T>>;

    /// The cached value, without refreshing.
    fn last(&self) -> Option<T>;
}

impl<T, C: Cache<T> + ?Sized> Cache<T> for Arc<C> {
    fn get(&self) -> Option<T> {
        (**self).get()
    }

    fn put(&self, value: T) {
        (**self).put(value)
    }

    fn reset(&self) {
        (**self).reset()
    }
}

impl<T, C: SuppliedCache<T> + ?Sized> SuppliedCache<T> for Arc<C> {
    fn get(&self, supplier: &mut dyn FnMut() -> TandemResult<T>) -> TandemResult<Option<T>> {
        (**self).get(supplier)
    }

    fn last(&self) -> Option<T> {
        (**self).last()
    }
}

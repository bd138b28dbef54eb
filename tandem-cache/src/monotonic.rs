//! A cache whose value only grows.

use crate::Cache;
use std::sync::RwLock;

/// Holds the maximum value ever put, until reset.
///
/// `put` first compares under a shared lock and returns early when the
/// stored value is already at least as large; only a real advance takes
/// the exclusive lock, where the comparison is repeated before storing.
#[derive(Debug)]
pub struct MonotonicCache<T> {
    value: RwLock<Option<T>>,
}

impl<T> MonotonicCache<T> {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    /// Cache seeded with an initial value.
    pub fn with_value(value: T) -> Self {
        Self {
            value: RwLock::new(Some(value)),
        }
    }
}

impl<T> Default for MonotonicCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone + Send + Sync> MonotonicCache<T> {
    fn advances(current: &Option<T>, candidate: &T) -> bool {
        match current {
            Some(current) => candidate > current,
            None => true,
        }
    }
}

impl<T: Ord + Clone + Send + Sync> Cache<T> for MonotonicCache<T> {
    fn get(&self) -> Option<T> {
        self.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn put(&self, value: T) {
        {
            let current = self.value.read().unwrap_or_else(|e| e.into_inner());
            if !Self::advances(&current, &value) {
                return;
            }
        }

        let mut current = self.value.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have advanced past us in between.
        if Self::advances(&current, &value) {
            *current = Some(value);
        }
    }

    fn reset(&self) {
        *self.value.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_keeps_maximum() {
        let cache = MonotonicCache::new();
        assert_eq!(cache.get(), None);
        cache.put(5);
        cache.put(2);
        cache.put(9);
        cache.put(9);
        assert_eq!(cache.get(), Some(9));
    }

    #[test]
    fn test_reset_clears() {
        let cache = MonotonicCache::with_value(10);
        cache.reset();
        assert_eq!(cache.get(), None);
        cache.put(1);
        assert_eq!(cache.get(), Some(1));
    }

    #[test]
    fn test_concurrent_writers_keep_max() {
        let cache = Arc::new(MonotonicCache::<u64>::new());
        let writers: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..1_000u64 {
                        cache.put(i * 8 + t);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(cache.get(), Some(999 * 8 + 7));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Whatever the order of puts, the cache ends at the maximum.
        #[test]
        fn prop_cache_holds_max(values in prop::collection::vec(any::<i64>(), 1..64)) {
            let cache = MonotonicCache::new();
            for value in &values {
                cache.put(*value);
            }
            prop_assert_eq!(cache.get(), values.iter().max().copied());
        }

        /// Values split across threads still converge on the maximum.
        #[test]
        fn prop_threads_hold_max(values in prop::collection::vec(any::<u32>(), 4..128)) {
            let cache = Arc::new(MonotonicCache::<u32>::new());
            let handles: Vec<_> = values
                .chunks(values.len() / 4)
                .map(|chunk| {
                    let cache = Arc::clone(&cache);
                    let chunk = chunk.to_vec();
                    thread::spawn(move || chunk.into_iter().for_each(|v| cache.put(v)))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            prop_assert_eq!(cache.get(), values.iter().max().copied());
        }
    }
}

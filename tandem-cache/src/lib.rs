//! In-process caches backing the consistency trackers.
//!
//! Two families live here:
//!
//! - [`Cache`]: a plain slot written by the caller. [`MonotonicCache`] only
//!   ever moves forward, so racing writers cannot lose the newest progress.
//! - [`SuppliedCache`]: a slot refreshed by a supplier on read. The
//!   single-flight variants make sure only one caller pays for a refresh
//!   while everyone else reads the last known value without blocking.
//!
//! None of these caches persist anything or cross a process boundary.
//!
//! # Example
//!
//! ```
//! use tandem_cache::{Cache, MonotonicCache};
//!
//! let cache = MonotonicCache::new();
//! cache.put(7);
//! cache.put(3);
//! assert_eq!(cache.get(), Some(7));
//! ```

pub mod monotonic;
pub mod pass_through;
pub mod single_flight;
pub mod timed;
pub mod traits;

pub use monotonic::MonotonicCache;
pub use pass_through::PassThroughCache;
pub use single_flight::SingleFlightCache;
pub use timed::{TimedSingleFlightCache, TimedSingleFlightCacheBuilder};
pub use traits::{Cache, SuppliedCache};

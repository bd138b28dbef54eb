//! Replication progress and replica topology.

use crate::{ConsistencyError, Handle, HandleSupplier, TandemError, TandemResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A position in the write-ahead log.
///
/// Positions are monotonically increasing; a replica whose replay position
/// is at least the position of a write has applied that write. Textual form
/// is the PostgreSQL `X/Y` notation: two hex halves of a 64 bit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition(pub u64);

impl LogPosition {
    pub const ZERO: LogPosition = LogPosition(0);

    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn offset(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for LogPosition {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            TandemError::Consistency(ConsistencyError::InvalidLogPosition {
                value: s.to_string(),
                reason: reason.to_string(),
            })
        };

        let (high, low) = s.trim().split_once('/').ok_or_else(|| invalid("expected X/Y"))?;
        let high = u32::from_str_radix(high, 16).map_err(|_| invalid("bad high half"))?;
        let low = u32::from_str_radix(low, 16).map_err(|_| invalid("bad low half"))?;
        Ok(LogPosition((u64::from(high) << 32) | u64::from(low)))
    }
}

/// Measures how far main and a replica have progressed.
pub trait DatabaseProgress<T>: Send + Sync {
    /// Progress of main, typically right after a write.
    fn fetch_main_progress(&self, main: &Handle) -> TandemResult<T>;

    /// Progress a replica has applied.
    fn fetch_replica_progress(&self, replica: &Handle) -> TandemResult<T>;
}

impl<T, P: DatabaseProgress<T> + ?Sized> DatabaseProgress<T> for Arc<P> {
    fn fetch_main_progress(&self, main: &Handle) -> TandemResult<T> {
        (**self).fetch_main_progress(main)
    }

    fn fetch_replica_progress(&self, replica: &Handle) -> TandemResult<T> {
        (**self).fetch_replica_progress(replica)
    }
}

type Connect = Arc<dyn Fn() -> TandemResult<Handle> + Send + Sync>;

/// One replica instance of a cluster, connected on demand.
#[derive(Clone)]
pub struct ReplicaNode {
    id: String,
    connect: Connect,
}

impl ReplicaNode {
    pub fn new<F>(id: impl Into<String>, connect: F) -> Self
    where
        F: Fn() -> TandemResult<Handle> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            connect: Arc::new(connect),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open a fresh handle to this node. The caller owns closing it.
    pub fn connect(&self) -> TandemResult<Handle> {
        (self.connect)()
    }
}

impl fmt::Debug for ReplicaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaNode").field("id", &self.id).finish()
    }
}

/// Lists the replica instances behind a replica endpoint.
pub trait ReplicaDiscovery: Send + Sync {
    fn list_replica_nodes(&self, replica: &dyn HandleSupplier) -> TandemResult<Vec<ReplicaNode>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_postgres_notation() {
        let position: LogPosition = "16/B374D848".parse().unwrap();
        assert_eq!(position.offset(), (0x16u64 << 32) | 0xB374_D848);
        assert_eq!(position.to_string(), "16/B374D848");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("16B374D848".parse::<LogPosition>().is_err());
        assert!("zz/10".parse::<LogPosition>().is_err());
        assert!("1/".parse::<LogPosition>().is_err());
    }

    #[test]
    fn test_ordering_follows_offset() {
        let earlier: LogPosition = "0/FFFFFFFF".parse().unwrap();
        let later: LogPosition = "1/0".parse().unwrap();
        assert!(later > earlier);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Display and parse agree for every offset.
        #[test]
        fn prop_display_parses_back(offset in any::<u64>()) {
            let position = LogPosition(offset);
            let parsed: LogPosition = position.to_string().parse().unwrap();
            prop_assert_eq!(parsed, position);
        }
    }
}

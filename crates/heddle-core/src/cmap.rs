//! Container ordinal bit set.
//!
//! Containers are enumerated once by the external registry and referenced
//! everywhere else by a stable small-integer ordinal. A `CMap` carries a set
//! of those ordinals as a fixed-width bitmask, which keeps feasibility
//! intersections and unions to single machine instructions during search.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A container ordinal assigned by the registry at enumeration time.
pub type Ordinal = u32;

/// Maximum number of container ordinals a `CMap` can carry.
pub const CMAP_WIDTH: u32 = 64;

/// Error raised when an ordinal does not fit the fixed map width.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("container ordinal {0} exceeds CMap width {CMAP_WIDTH}")]
pub struct CMapError(pub Ordinal);

/// A set of container ordinals, one bit per ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CMap(u64);

impl CMap {
    /// The empty set.
    pub const EMPTY: CMap = CMap(0);

    /// Build a map from an iterator of ordinals.
    pub fn from_ordinals<I: IntoIterator<Item = Ordinal>>(ordinals: I) -> Result<Self, CMapError> {
        let mut map = CMap::EMPTY;
        for ordinal in ordinals {
            map.insert(ordinal)?;
        }
        Ok(map)
    }

    /// Insert an ordinal. Fails loudly past the fixed width so an
    /// outgrown registry cannot silently drop containers.
    pub fn insert(&mut self, ordinal: Ordinal) -> Result<(), CMapError> {
        if ordinal >= CMAP_WIDTH {
            return Err(CMapError(ordinal));
        }
        self.0 |= 1u64 << ordinal;
        Ok(())
    }

    /// Remove an ordinal (out-of-range ordinals are never present).
    pub fn remove(&mut self, ordinal: Ordinal) {
        if ordinal < CMAP_WIDTH {
            self.0 &= !(1u64 << ordinal);
        }
    }

    /// Membership test.
    pub fn contains(&self, ordinal: Ordinal) -> bool {
        ordinal < CMAP_WIDTH && self.0 & (1u64 << ordinal) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of ordinals in the set.
    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    /// Union of two maps.
    pub fn union(&self, other: &CMap) -> CMap {
        CMap(self.0 | other.0)
    }

    /// Intersection of two maps.
    pub fn intersection(&self, other: &CMap) -> CMap {
        CMap(self.0 & other.0)
    }

    pub fn intersects(&self, other: &CMap) -> bool {
        self.0 & other.0 != 0
    }

    /// Lowest ordinal in the set, if any.
    pub fn first(&self) -> Option<Ordinal> {
        if self.is_empty() {
            None
        } else {
            Some(self.0.trailing_zeros())
        }
    }

    /// Iterate ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ordinal> + '_ {
        let bits = self.0;
        (0..CMAP_WIDTH).filter(move |o| bits & (1u64 << o) != 0)
    }
}

impl std::fmt::Display for CMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, ordinal) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{ordinal}")?;
        }
        write!(f, "}}")
    }
}

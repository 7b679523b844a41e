use s2::cellid::CellID;
use serde::{Deserialize, Serialize};

/// A single cell of a covering: an S2 cell id together with its level.
///
/// The level is redundant with the id (S2 encodes it in the position of the
/// lowest set bit) but is carried explicitly so callers can bucket and
/// validate entries without decoding the id.
///
/// # Examples
///
/// ```
/// use geomap_types::cell::CellEntry;
/// use s2::cellid::CellID;
///
/// let face = CellEntry::from_cell_id(CellID::from_face(2));
/// assert_eq!(face.level, 0);
/// assert!(face.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellEntry {
    /// Level in the cell hierarchy (0 = face cell, 30 = leaf cell)
    pub level: u8,
    /// Raw S2 cell id
    pub cell_id: u64,
}

impl CellEntry {
    /// Deepest level of the S2 hierarchy.
    pub const MAX_LEVEL: u8 = 30;

    /// Create an entry from raw parts. No validation is performed; see [`CellEntry::is_valid`].
    pub fn new(level: u8, cell_id: u64) -> Self {
        Self { level, cell_id }
    }

    /// Create an entry from an S2 cell id, deriving the level from the id.
    pub fn from_cell_id(cell: CellID) -> Self {
        Self {
            level: cell.level() as u8,
            cell_id: cell.0,
        }
    }

    /// The S2 cell id of this entry.
    pub fn cell(&self) -> CellID {
        CellID(self.cell_id)
    }

    /// True when the id is a valid S2 cell id and its encoded level matches `level`.
    pub fn is_valid(&self) -> bool {
        if self.level > Self::MAX_LEVEL {
            return false;
        }
        let cell = self.cell();
        cell.is_valid() && cell.level() == u64::from(self.level)
    }

    /// Ancestor of this entry at `level`. Returns `self` when `level >= self.level`.
    pub fn parent(&self, level: u8) -> Self {
        if level >= self.level {
            return *self;
        }
        Self {
            level,
            cell_id: self.cell().parent(u64::from(level)).0,
        }
    }

    /// True when `self` is an ancestor of `other` or equal to it.
    pub fn contains(&self, other: &CellEntry) -> bool {
        self.level <= other.level && self.cell().contains(&other.cell())
    }

    /// Smallest leaf id covered by this cell.
    pub fn range_min(&self) -> u64 {
        self.cell().range_min().0
    }

    /// Largest leaf id covered by this cell.
    pub fn range_max(&self) -> u64 {
        self.cell().range_max().0
    }
}

impl From<CellID> for CellEntry {
    fn from(cell: CellID) -> Self {
        Self::from_cell_id(cell)
    }
}

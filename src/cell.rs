//! Cell hierarchy adapter.
//!
//! Thin layer over the `s2` crate: validates coverings, walks ancestor
//! chains and turns `geo` regions into ordered `CellEntry` coverings.

use crate::config::CoveringOptions;
use crate::error::{GeoMapError, Result};
use geo::{Point, Rect};
use geomap_types::CellEntry;
use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::region::RegionCoverer;
use smallvec::SmallVec;

/// Ancestor chains rarely exceed a couple of bucket ranges worth of levels.
pub type AncestorChain = SmallVec<[CellEntry; 16]>;

/// True when stored cell `a` spatially contains query cell `b` (ancestor or equal).
#[inline]
pub fn is_ancestor(a: &CellEntry, b: &CellEntry) -> bool {
    a.contains(b)
}

/// Ancestors of `entry` from its own level up to `min_level`, finest first.
///
/// The entry itself is included when `entry.level >= min_level`. Returns an
/// empty chain when the entry is coarser than `min_level`.
pub fn ancestors(entry: &CellEntry, min_level: u8) -> AncestorChain {
    let mut chain = AncestorChain::new();
    if entry.level < min_level {
        return chain;
    }
    for level in (min_level..=entry.level).rev() {
        chain.push(entry.parent(level));
    }
    chain
}

/// Reject empty coverings and entries the S2 hierarchy would not produce.
pub fn validate_covering(covering: &[CellEntry], operation: &str) -> Result<()> {
    if covering.is_empty() {
        return Err(GeoMapError::invalid_argument(format!(
            "{}: covering must contain at least one cell",
            operation
        )));
    }

    if let Some(bad) = covering.iter().find(|entry| !entry.is_valid()) {
        return Err(GeoMapError::invalid_argument(format!(
            "{}: malformed cell (level {}, id {:#018x})",
            operation, bad.level, bad.cell_id
        )));
    }

    Ok(())
}

/// Build an ordered, duplicate-free covering from raw S2 cell ids.
pub fn covering_from_cell_ids<I>(cells: I) -> Vec<CellEntry>
where
    I: IntoIterator<Item = CellID>,
{
    let mut covering: Vec<CellEntry> = cells.into_iter().map(CellEntry::from_cell_id).collect();
    covering.sort_unstable_by_key(|entry| entry.cell_id);
    covering.dedup();
    covering
}

/// Validates a point has valid longitude and latitude.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
pub fn validate_geographic_point(point: &Point) -> Result<()> {
    let (x, y) = (point.x(), point.y());

    if !x.is_finite() || !y.is_finite() {
        return Err(GeoMapError::invalid_argument(format!(
            "Coordinates must be finite, got: ({}, {})",
            x, y
        )));
    }

    if !(-180.0..=180.0).contains(&x) {
        return Err(GeoMapError::invalid_argument(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            x
        )));
    }

    if !(-90.0..=90.0).contains(&y) {
        return Err(GeoMapError::invalid_argument(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            y
        )));
    }

    Ok(())
}

/// Cell containing `point` at `level`.
pub fn cover_point(point: &Point, level: u8) -> Result<CellEntry> {
    validate_geographic_point(point)?;
    if level > CellEntry::MAX_LEVEL {
        return Err(GeoMapError::invalid_argument(format!(
            "Cell level must be at most {}, got {}",
            CellEntry::MAX_LEVEL,
            level
        )));
    }

    let leaf = CellID::from(&LatLng::from_degrees(point.y(), point.x()));
    Ok(CellEntry::from_cell_id(leaf.parent(u64::from(level))))
}

/// Covering of a lon/lat rectangle using the S2 region coverer.
///
/// The result is ordered by cell id and never empty for a valid rectangle.
pub fn cover_rect(rect: &Rect, options: &CoveringOptions) -> Result<Vec<CellEntry>> {
    options.validate().map_err(GeoMapError::InvalidArgument)?;
    let (min, max) = (rect.min(), rect.max());
    validate_geographic_point(&Point::from(min))?;
    validate_geographic_point(&Point::from(max))?;

    let region = s2::rect::Rect::from_degrees(min.y, min.x, max.y, max.x);
    let coverer = RegionCoverer {
        min_level: options.min_level,
        max_level: options.max_level,
        level_mod: 1,
        max_cells: options.max_cells,
    };
    let covering = covering_from_cell_ids(coverer.covering(&region).0);

    if covering.is_empty() {
        return Err(GeoMapError::invalid_argument(
            "cover_rect: region produced an empty covering",
        ));
    }
    Ok(covering)
}

//! Containment and intersection queries over a bucket index.
//!
//! A stored cell `a` spatially contains a query cell `b` when `a` is an
//! ancestor of `b` or equal to it. Both queries are resolved per query cell
//! and then combined:
//!
//! - **contains**: records with an ancestor-or-equal cell for *every* query
//!   cell (per-cell candidates are intersected).
//! - **intersects**: records with an ancestor-or-equal or a descendant cell
//!   for *any* query cell (per-cell candidates are unioned).
//!
//! The algorithms only read the buckets they need, through [`BucketSource`],
//! so the persisted reader decodes nothing beyond the touched buckets.

use crate::bitmap::IdSet;
use crate::cell::{ancestors, validate_covering};
use crate::error::Result;
use crate::index::BucketKey;
use geomap_types::CellEntry;
use std::sync::Arc;

/// Read access to frozen buckets.
pub trait BucketSource {
    /// Width of a level range.
    fn level_index_bucket_range(&self) -> u8;

    /// Coarsest and finest stored level, `None` for an empty index.
    fn level_bounds(&self) -> Option<(u8, u8)>;

    /// Bitmap of the bucket with exactly `key`.
    fn bucket(&self, key: BucketKey) -> Result<Option<Arc<IdSet>>>;

    /// Buckets in `level_range` whose cell id lies in `[lo, hi]`, in key order.
    fn scan(&self, level_range: u8, lo: u64, hi: u64) -> Result<Vec<(BucketKey, Arc<IdSet>)>>;
}

/// Records whose stored region contains the whole query covering.
pub fn contains_ids<S>(source: &S, query: &[CellEntry]) -> Result<IdSet>
where
    S: BucketSource + ?Sized,
{
    validate_covering(query, "contains")?;
    let Some(bounds) = source.level_bounds() else {
        return Ok(IdSet::new());
    };

    let mut result: Option<IdSet> = None;
    for cell in query {
        let candidates = ancestor_candidates(source, cell, bounds)?;
        let acc = match result {
            Some(mut acc) => {
                acc &= &candidates;
                acc
            }
            None => candidates,
        };
        if acc.is_empty() {
            return Ok(acc);
        }
        result = Some(acc);
    }

    Ok(result.unwrap_or_else(IdSet::new))
}

/// Records whose stored region overlaps the query covering.
pub fn intersects_ids<S>(source: &S, query: &[CellEntry]) -> Result<IdSet>
where
    S: BucketSource + ?Sized,
{
    validate_covering(query, "intersects")?;
    let Some(bounds) = source.level_bounds() else {
        return Ok(IdSet::new());
    };

    let mut result = IdSet::new();
    for cell in query {
        result |= &ancestor_candidates(source, cell, bounds)?;
        result |= &descendant_candidates(source, cell, bounds)?;
    }

    Ok(result)
}

/// Union of the buckets of `cell` and all of its stored ancestors.
fn ancestor_candidates<S>(source: &S, cell: &CellEntry, (min_level, max_level): (u8, u8)) -> Result<IdSet>
where
    S: BucketSource + ?Sized,
{
    let range = source.level_index_bucket_range();
    let mut candidates = IdSet::new();

    // Nothing is stored below max_level, so the walk can start there.
    let start = cell.parent(max_level);
    for ancestor in ancestors(&start, min_level) {
        if let Some(bitmap) = source.bucket(BucketKey::for_entry(&ancestor, range))? {
            candidates |= bitmap.as_ref();
        }
    }

    Ok(candidates)
}

/// Union of the buckets of every stored strict descendant of `cell`.
///
/// S2 assigns every descendant an id inside `[range_min, range_max]` of its
/// ancestor and no coarser cell falls inside that interval, so a bounded scan
/// per level-range window finds exactly the descendants (plus `cell` itself,
/// which is filtered out).
fn descendant_candidates<S>(source: &S, cell: &CellEntry, (_, max_level): (u8, u8)) -> Result<IdSet>
where
    S: BucketSource + ?Sized,
{
    let mut candidates = IdSet::new();
    if cell.level >= max_level {
        return Ok(candidates);
    }

    let range = source.level_index_bucket_range();
    let (lo, hi) = (cell.range_min(), cell.range_max());
    for level_range in (cell.level / range)..=(max_level / range) {
        for (key, bitmap) in source.scan(level_range, lo, hi)? {
            if key.cell_id != cell.cell_id {
                candidates |= bitmap.as_ref();
            }
        }
    }

    Ok(candidates)
}

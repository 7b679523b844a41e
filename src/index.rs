//! Bucket index built up by the writer.
//!
//! Every covering cell of every record lands in the bucket keyed by
//! `(level / level_index_bucket_range, cell_id)`, which holds a bitmap of the
//! record ids whose covering contains exactly that cell. Buckets live in a
//! hash map while records are written and are frozen into a sorted vector at
//! build time so they can be binary searched and range scanned.

use crate::bitmap::IdSet;
use crate::error::Result;
use crate::query::BucketSource;
use geomap_types::{CellEntry, RecordId};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::Arc;

/// Key of a bucket: level range first, then cell id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub level_range: u8,
    pub cell_id: u64,
}

impl BucketKey {
    pub fn new(level_range: u8, cell_id: u64) -> Self {
        Self {
            level_range,
            cell_id,
        }
    }

    /// Bucket that holds `entry` for the given range width.
    #[inline]
    pub fn for_entry(entry: &CellEntry, level_index_bucket_range: u8) -> Self {
        Self {
            level_range: entry.level / level_index_bucket_range,
            cell_id: entry.cell_id,
        }
    }
}

/// Positions of the items with `level_range` and a cell id in `[lo, hi]`.
///
/// `items` must be sorted by `key`.
pub(crate) fn scan_bounds<T>(
    items: &[T],
    key: impl Fn(&T) -> BucketKey,
    level_range: u8,
    lo: u64,
    hi: u64,
) -> Range<usize> {
    let start = items.partition_point(|item| key(item) < BucketKey::new(level_range, lo));
    let end = items.partition_point(|item| key(item) <= BucketKey::new(level_range, hi));
    start..end.max(start)
}

/// Mutable bucket index owned by the writer.
#[derive(Debug)]
pub struct BucketIndex {
    level_index_bucket_range: u8,
    buckets: FxHashMap<BucketKey, IdSet>,
    level_bounds: Option<(u8, u8)>,
}

impl BucketIndex {
    pub fn new(level_index_bucket_range: u8) -> Self {
        debug_assert!(level_index_bucket_range > 0);
        Self {
            level_index_bucket_range,
            buckets: FxHashMap::default(),
            level_bounds: None,
        }
    }

    /// Record `id` in the bucket of every cell of `covering`.
    ///
    /// The covering must already be validated.
    pub fn insert(&mut self, covering: &[CellEntry], id: RecordId) {
        for entry in covering {
            let key = BucketKey::for_entry(entry, self.level_index_bucket_range);
            self.buckets.entry(key).or_insert_with(IdSet::new).insert(id);

            self.level_bounds = Some(match self.level_bounds {
                Some((min, max)) => (min.min(entry.level), max.max(entry.level)),
                None => (entry.level, entry.level),
            });
        }
    }

    /// Number of distinct buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn level_index_bucket_range(&self) -> u8 {
        self.level_index_bucket_range
    }

    /// Finest and coarsest level seen so far, `None` before the first insert.
    pub fn level_bounds(&self) -> Option<(u8, u8)> {
        self.level_bounds
    }

    /// Total number of (bucket, record) memberships.
    pub fn memberships(&self) -> u64 {
        self.buckets.values().map(|set| set.len()).sum()
    }

    /// Borrowed buckets in key order.
    pub fn sorted(&self) -> Vec<(BucketKey, &IdSet)> {
        let mut buckets: Vec<(BucketKey, &IdSet)> =
            self.buckets.iter().map(|(key, set)| (*key, set)).collect();
        buckets.sort_unstable_by_key(|(key, _)| *key);
        buckets
    }

    /// Freeze into the sorted, read-only form.
    pub fn freeze(self) -> SortedBuckets {
        let mut buckets: Vec<(BucketKey, Arc<IdSet>)> = self
            .buckets
            .into_iter()
            .map(|(key, set)| (key, Arc::new(set)))
            .collect();
        buckets.sort_unstable_by_key(|(key, _)| *key);

        SortedBuckets {
            level_index_bucket_range: self.level_index_bucket_range,
            level_bounds: self.level_bounds,
            buckets,
        }
    }
}

/// Buckets sorted by `(level_range, cell_id)`.
#[derive(Debug, Clone)]
pub struct SortedBuckets {
    level_index_bucket_range: u8,
    level_bounds: Option<(u8, u8)>,
    buckets: Vec<(BucketKey, Arc<IdSet>)>,
}

impl SortedBuckets {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(BucketKey, Arc<IdSet>)> {
        self.buckets.iter()
    }

    pub fn get(&self, key: &BucketKey) -> Option<&Arc<IdSet>> {
        self.buckets
            .binary_search_by_key(key, |(k, _)| *k)
            .ok()
            .map(|pos| &self.buckets[pos].1)
    }
}

impl BucketSource for SortedBuckets {
    fn level_index_bucket_range(&self) -> u8 {
        self.level_index_bucket_range
    }

    fn level_bounds(&self) -> Option<(u8, u8)> {
        self.level_bounds
    }

    fn bucket(&self, key: BucketKey) -> Result<Option<Arc<IdSet>>> {
        Ok(self.get(&key).cloned())
    }

    fn scan(&self, level_range: u8, lo: u64, hi: u64) -> Result<Vec<(BucketKey, Arc<IdSet>)>> {
        let range = scan_bounds(&self.buckets, |(k, _)| *k, level_range, lo, hi);
        Ok(self.buckets[range].to_vec())
    }
}

use serde::{Deserialize, Serialize};

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoMapStats {
    /// Number of records (keys) stored in the index
    pub record_count: u64,
    /// Number of `(level range, cell id)` buckets
    pub bucket_count: u64,
    /// Width of a level range
    pub level_index_bucket_range: u8,
    /// Number of bucket bitmaps decoded and cached so far
    pub cached_buckets: usize,
    /// Whether the key table has been loaded
    pub key_table_loaded: bool,
    /// Size of the index file in bytes
    pub file_size_bytes: u64,
}

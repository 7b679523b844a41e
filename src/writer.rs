//! Write side of the index: accumulate records, then build the file once.

use crate::bitmap;
use crate::cell::{cover_point, cover_rect, validate_covering};
use crate::config::GeoMapConfig;
use crate::error::{GeoMapError, Result};
use crate::index::BucketIndex;
use crate::storage::format::{self, DirectoryEntry, Header, DIRECTORY_ENTRY_LEN, HEADER_LEN};
use crate::storage::{write_atomically, KeyTableBuilder};
use bytes::Bytes;
use geo::{Point, Rect};
use geomap_types::{CellEntry, RecordId};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Built,
    Closed,
}

impl WriterState {
    fn name(self) -> &'static str {
        match self {
            WriterState::Open => "open",
            WriterState::Built => "built",
            WriterState::Closed => "closed",
        }
    }
}

/// Collects `(covering, key)` records and persists them as an index file.
///
/// Record ids are assigned densely in write order, starting at 0. After a
/// successful [`build`](Self::build) the writer is spent and rejects further
/// writes and builds.
///
/// # Examples
///
/// ```rust
/// use geomap::{CellEntry, GeoMapReader, GeoMapWriter};
/// use s2::cellid::CellID;
/// use s2::latlng::LatLng;
///
/// # fn main() -> geomap::Result<()> {
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("cities.geomap");
///
/// let leaf = CellID::from(&LatLng::from_degrees(40.7128, -74.0060));
/// let nyc = CellEntry::from_cell_id(leaf.parent(10));
///
/// let mut writer = GeoMapWriter::new(3)?;
/// writer.write(&[nyc], "new-york")?;
/// writer.build(&path)?;
///
/// let reader = GeoMapReader::open(&path)?;
/// assert_eq!(reader.contains(&[nyc])?, vec!["new-york"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GeoMapWriter {
    config: GeoMapConfig,
    index: BucketIndex,
    keys: KeyTableBuilder,
    state: WriterState,
}

impl GeoMapWriter {
    /// Writer with default configuration and the given bucket range width.
    pub fn new(level_index_bucket_range: u8) -> Result<Self> {
        Self::with_config(
            GeoMapConfig::default().with_level_index_bucket_range(level_index_bucket_range),
        )
    }

    pub fn with_config(config: GeoMapConfig) -> Result<Self> {
        config.validate().map_err(GeoMapError::InvalidArgument)?;
        Ok(Self {
            index: BucketIndex::new(config.level_index_bucket_range),
            keys: KeyTableBuilder::new(),
            config,
            state: WriterState::Open,
        })
    }

    pub fn config(&self) -> &GeoMapConfig {
        &self.config
    }

    /// Number of records written so far
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of distinct buckets touched so far
    pub fn bucket_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_built(&self) -> bool {
        self.state == WriterState::Built
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state == WriterState::Open {
            return Ok(());
        }
        Err(GeoMapError::InvalidState {
            operation,
            object: "writer",
            state: self.state.name(),
        })
    }

    fn validate_key(&self, key: &[u8]) -> Result<()> {
        let limit = self
            .config
            .max_key_len
            .unwrap_or(u32::MAX as usize)
            .min(u32::MAX as usize);
        if key.len() > limit {
            return Err(GeoMapError::invalid_argument(format!(
                "write: key of {} bytes exceeds limit of {} bytes",
                key.len(),
                limit
            )));
        }
        Ok(())
    }

    /// Add a record and return its id.
    ///
    /// Nothing is recorded when the covering or the key is rejected.
    pub fn write(&mut self, covering: &[CellEntry], key: impl AsRef<[u8]>) -> Result<RecordId> {
        self.ensure_open("write")?;
        let key = key.as_ref();
        validate_covering(covering, "write")?;
        self.validate_key(key)?;

        let id = self.keys.len() as RecordId;
        self.index.insert(covering, id);
        self.keys.push(Bytes::copy_from_slice(key));
        Ok(id)
    }

    /// Add a record covering a lon/lat rectangle.
    pub fn write_rect(&mut self, rect: &Rect, key: impl AsRef<[u8]>) -> Result<RecordId> {
        self.ensure_open("write")?;
        let covering = cover_rect(rect, &self.config.covering)?;
        self.write(&covering, key)
    }

    /// Add a record for a single point, stored at the finest covering level.
    pub fn write_point(&mut self, point: &Point, key: impl AsRef<[u8]>) -> Result<RecordId> {
        self.ensure_open("write")?;
        let cell = cover_point(point, self.config.covering.max_level)?;
        self.write(&[cell], key)
    }

    /// Persist every record to `path`.
    ///
    /// The file appears at `path` only once it is complete. Any failure
    /// leaves the writer closed.
    pub fn build(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open("build")?;
        let path = path.as_ref();
        let start = Instant::now();

        match self.write_file(path) {
            Ok(size) => {
                self.state = WriterState::Built;
                log::debug!(
                    "Built geomap index {}: {} records, {} buckets, {} bytes in {:?}",
                    path.display(),
                    self.keys.len(),
                    self.index.len(),
                    size,
                    start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to build geomap index {}: {}", path.display(), e);
                self.close();
                Err(e)
            }
        }
    }

    fn write_file(&self, path: &Path) -> Result<u64> {
        let range = self.config.level_index_bucket_range;
        let buckets = self.index.sorted();

        let mut blobs = Vec::new();
        let mut directory = Vec::with_capacity(buckets.len());
        for (key, set) in buckets {
            let start = blobs.len();
            bitmap::encode_into(set, &mut blobs)?;
            directory.push(DirectoryEntry::for_blob(key, start as u64, &blobs[start..]));
        }
        let directory_bytes = format::encode_directory(&directory);

        let (min_level, max_level) = self.index.level_bounds().unwrap_or((0, 0));
        let bitmaps_offset = (HEADER_LEN + directory.len() * DIRECTORY_ENTRY_LEN) as u64;
        let key_table_offset = bitmaps_offset + blobs.len() as u64;
        let header = Header {
            level_index_bucket_range: range,
            min_level,
            max_level,
            record_count: self.keys.len() as u64,
            bucket_count: directory.len() as u64,
            directory_offset: HEADER_LEN as u64,
            bitmaps_offset,
            key_table_offset,
            key_table_len: self.keys.encoded_len(),
            directory_crc32: crc32fast::hash(&directory_bytes),
        };
        let header_bytes = header.encode();

        write_atomically(path, |out| {
            out.write_all(&header_bytes)
                .and_then(|_| out.write_all(&directory_bytes))
                .and_then(|_| out.write_all(&blobs))
                .map_err(|e| GeoMapError::io("write index file", e))?;
            self.keys.write_to(out)
        })
    }

    /// Release buffered records. Idempotent; a closed writer rejects everything.
    pub fn close(&mut self) {
        if self.state == WriterState::Closed {
            return;
        }
        self.state = WriterState::Closed;
        self.index = BucketIndex::new(self.config.level_index_bucket_range);
        self.keys = KeyTableBuilder::new();
    }
}

//! Read side of the index.
//!
//! Opening a file reads only the header and the bucket directory. Bucket
//! bitmaps are decoded the first time a query touches them and the key table
//! is loaded on the first key resolution; both stay cached until the reader
//! is closed or dropped.

use crate::bitmap::{self, IdSet};
use crate::cell::{cover_point, cover_rect};
use crate::config::CoveringOptions;
use crate::error::{GeoMapError, Result};
use crate::index::{scan_bounds, BucketKey};
use crate::query::{self, BucketSource};
use crate::storage::format::{decode_directory, DirectoryEntry, Header, HEADER_LEN};
use crate::storage::{read_at, KeyTable};
use bytes::Bytes;
use geo::{Point, Rect};
use geomap_types::{CellEntry, GeoMapStats};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable view over a built index file.
///
/// All query methods take `&self`; a reader can be shared across threads
/// behind an `Arc`.
#[derive(Debug)]
pub struct GeoMapReader {
    path: PathBuf,
    header: Header,
    directory: Vec<DirectoryEntry>,
    file_len: u64,
    file: Mutex<Option<File>>,
    /// Decoded bitmaps, one slot per directory entry
    buckets: Vec<OnceCell<Arc<IdSet>>>,
    key_table: OnceCell<KeyTable>,
    closed: bool,
}

impl GeoMapReader {
    /// Open an index file and validate its header and bucket directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| GeoMapError::io("open index file", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| GeoMapError::io("stat index file", e))?
            .len();

        let (header, directory) = match Self::read_metadata(&mut file, file_len) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Rejected geomap index {}: {}", path.display(), e);
                return Err(e);
            }
        };

        log::debug!(
            "Opened geomap index {}: {} records, {} buckets, {} bytes",
            path.display(),
            header.record_count,
            header.bucket_count,
            file_len
        );

        let buckets = (0..directory.len()).map(|_| OnceCell::new()).collect();
        Ok(Self {
            path: path.to_path_buf(),
            header,
            directory,
            file_len,
            file: Mutex::new(Some(file)),
            buckets,
            key_table: OnceCell::new(),
            closed: false,
        })
    }

    fn read_metadata(file: &mut File, file_len: u64) -> Result<(Header, Vec<DirectoryEntry>)> {
        if file_len < HEADER_LEN as u64 {
            return Err(GeoMapError::corruption(format!(
                "file of {} bytes is shorter than the header",
                file_len
            )));
        }
        let header_bytes = read_at(file, 0, HEADER_LEN as u64)?;
        let header = Header::decode(&header_bytes, file_len)?;

        let directory_bytes = read_at(file, header.directory_offset, header.directory_len())?;
        let directory = decode_directory(&directory_bytes, &header)?;
        Ok((header, directory))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_count(&self) -> u64 {
        self.header.record_count
    }

    pub fn bucket_count(&self) -> u64 {
        self.header.bucket_count
    }

    pub fn level_index_bucket_range(&self) -> u8 {
        self.header.level_index_bucket_range
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.closed {
            return Err(GeoMapError::InvalidState {
                operation,
                object: "reader",
                state: "closed",
            });
        }
        Ok(())
    }

    fn read_section(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(GeoMapError::InvalidState {
            operation: "read",
            object: "reader",
            state: "closed",
        })?;
        read_at(file, offset, len)
    }

    /// Decode the bitmap at directory position `pos`, at most once.
    fn load_bucket(&self, pos: usize) -> Result<Arc<IdSet>> {
        self.buckets[pos]
            .get_or_try_init(|| self.decode_bucket(&self.directory[pos]))
            .cloned()
    }

    fn decode_bucket(&self, entry: &DirectoryEntry) -> Result<Arc<IdSet>> {
        let bytes = self.read_section(self.header.bitmaps_offset + entry.offset, entry.len)?;
        entry.verify_blob(&bytes)?;
        let set = bitmap::decode(&bytes)?;
        if let Some(max) = set.max()
            && max >= self.header.record_count
        {
            return Err(GeoMapError::corruption(format!(
                "bucket ({}, {:#018x}) references record {} of {}",
                entry.key.level_range, entry.key.cell_id, max, self.header.record_count
            )));
        }

        log::trace!(
            "Loaded bucket ({}, {:#018x}) with {} records",
            entry.key.level_range,
            entry.key.cell_id,
            set.len()
        );
        Ok(Arc::new(set))
    }

    /// Bitmap of the bucket with exactly `key`, if one was stored.
    pub fn lookup_bucket(&self, key: BucketKey) -> Result<Option<Arc<IdSet>>> {
        self.ensure_open("query")?;
        match self.directory.binary_search_by_key(&key, |entry| entry.key) {
            Ok(pos) => self.load_bucket(pos).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Buckets in `level_range` whose cell id lies in `[lo, hi]`, in key order.
    pub fn scan_buckets(
        &self,
        level_range: u8,
        lo: u64,
        hi: u64,
    ) -> Result<Vec<(BucketKey, Arc<IdSet>)>> {
        self.ensure_open("query")?;
        scan_bounds(&self.directory, |entry| entry.key, level_range, lo, hi)
            .map(|pos| Ok((self.directory[pos].key, self.load_bucket(pos)?)))
            .collect()
    }

    fn key_table(&self) -> Result<&KeyTable> {
        self.key_table.get_or_try_init(|| {
            let bytes = self.read_section(self.header.key_table_offset, self.header.key_table_len)?;
            let table = KeyTable::decode(Bytes::from(bytes), self.header.record_count)?;
            log::debug!("Loaded key table of {} keys from {}", table.len(), self.path.display());
            Ok(table)
        })
    }

    /// Keys of `ids` in ascending id order.
    pub fn resolve_keys(&self, ids: &IdSet) -> Result<Vec<Bytes>> {
        self.ensure_open("read keys from")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.key_table()?.resolve(ids)
    }

    /// Ids of records whose region contains the whole query covering.
    pub fn contains_ids(&self, query: &[CellEntry]) -> Result<IdSet> {
        self.ensure_open("query")?;
        query::contains_ids(self, query)
    }

    /// Ids of records whose region overlaps the query covering.
    pub fn intersects_ids(&self, query: &[CellEntry]) -> Result<IdSet> {
        self.ensure_open("query")?;
        query::intersects_ids(self, query)
    }

    /// Keys of records whose region contains the whole query covering.
    pub fn contains(&self, query: &[CellEntry]) -> Result<Vec<Bytes>> {
        let ids = self.contains_ids(query)?;
        self.resolve_keys(&ids)
    }

    /// Keys of records whose region overlaps the query covering.
    pub fn intersects(&self, query: &[CellEntry]) -> Result<Vec<Bytes>> {
        let ids = self.intersects_ids(query)?;
        self.resolve_keys(&ids)
    }

    pub fn contains_rect(&self, rect: &Rect, options: &CoveringOptions) -> Result<Vec<Bytes>> {
        self.ensure_open("query")?;
        self.contains(&cover_rect(rect, options)?)
    }

    pub fn intersects_rect(&self, rect: &Rect, options: &CoveringOptions) -> Result<Vec<Bytes>> {
        self.ensure_open("query")?;
        self.intersects(&cover_rect(rect, options)?)
    }

    /// Keys of records whose region contains `point`, probed at `level`.
    pub fn contains_point(&self, point: &Point, level: u8) -> Result<Vec<Bytes>> {
        self.ensure_open("query")?;
        self.contains(&[cover_point(point, level)?])
    }

    /// Release the file handle and cached buckets. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        *self.file.get_mut() = None;
        for slot in &mut self.buckets {
            slot.take();
        }
        self.key_table.take();
        log::debug!("Closed geomap index {}", self.path.display());
    }

    pub fn stats(&self) -> GeoMapStats {
        GeoMapStats {
            record_count: self.header.record_count,
            bucket_count: self.header.bucket_count,
            level_index_bucket_range: self.header.level_index_bucket_range,
            cached_buckets: self.buckets.iter().filter(|slot| slot.get().is_some()).count(),
            key_table_loaded: self.key_table.get().is_some(),
            file_size_bytes: self.file_len,
        }
    }
}

impl BucketSource for GeoMapReader {
    fn level_index_bucket_range(&self) -> u8 {
        self.header.level_index_bucket_range
    }

    fn level_bounds(&self) -> Option<(u8, u8)> {
        self.header.level_bounds()
    }

    fn bucket(&self, key: BucketKey) -> Result<Option<Arc<IdSet>>> {
        self.lookup_bucket(key)
    }

    fn scan(&self, level_range: u8, lo: u64, hi: u64) -> Result<Vec<(BucketKey, Arc<IdSet>)>> {
        self.scan_buckets(level_range, lo, hi)
    }
}

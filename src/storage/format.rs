//! On-disk layout of a geomap index file.
//!
//! All integers are little-endian.
//!
//! ```text
//! Header (72 bytes):
//!   magic: "SPGEOMAP" (8B)
//!   format_version: u8
//!   level_index_bucket_range: u8
//!   min_level: u8
//!   max_level: u8
//!   _reserved: u32
//!   record_count: u64
//!   bucket_count: u64
//!   directory_offset: u64
//!   bitmaps_offset: u64
//!   key_table_offset: u64
//!   key_table_len: u64
//!   directory_crc32: u32
//!   header_crc32: u32        -- CRC32 of the 68 bytes before it
//!
//! Directory (bucket_count x 29 bytes, sorted by (level_range, cell_id)):
//!   level_range: u8
//!   cell_id: u64
//!   bitmap_offset: u64       -- relative to bitmaps_offset
//!   bitmap_len: u64
//!   bitmap_crc32: u32
//!
//! Bitmaps:
//!   one independently decodable roaring treemap per directory entry
//!
//! Key table:
//!   record_count x (len: u32, key bytes)
//! ```

use crate::error::{GeoMapError, Result};
use crate::index::BucketKey;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use geomap_types::CellEntry;

/// Magic bytes at the start of every index file.
pub const MAGIC: &[u8; 8] = b"SPGEOMAP";

/// Current file format version.
pub const FORMAT_VERSION: u8 = 1;

/// Fixed header length.
pub const HEADER_LEN: usize = 72;

/// Serialized size of one directory entry.
pub const DIRECTORY_ENTRY_LEN: usize = 29;

/// Size of the per-key length prefix in the key table.
pub const KEY_LEN_PREFIX: usize = 4;

const HEADER_CRC_OFFSET: usize = HEADER_LEN - 4;

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub level_index_bucket_range: u8,
    pub min_level: u8,
    pub max_level: u8,
    pub record_count: u64,
    pub bucket_count: u64,
    pub directory_offset: u64,
    pub bitmaps_offset: u64,
    pub key_table_offset: u64,
    pub key_table_len: u64,
    pub directory_crc32: u32,
}

impl Header {
    /// Coarsest and finest stored level, `None` when no bucket exists.
    pub fn level_bounds(&self) -> Option<(u8, u8)> {
        (self.bucket_count > 0).then_some((self.min_level, self.max_level))
    }

    /// Length of the bitmap section in bytes.
    pub fn bitmaps_len(&self) -> u64 {
        self.key_table_offset - self.bitmaps_offset
    }

    /// Length of the directory section in bytes.
    pub fn directory_len(&self) -> u64 {
        self.bitmaps_offset - self.directory_offset
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.put_slice(MAGIC);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u8(self.level_index_bucket_range);
        buf.put_u8(self.min_level);
        buf.put_u8(self.max_level);
        buf.put_u32_le(0);
        buf.put_u64_le(self.record_count);
        buf.put_u64_le(self.bucket_count);
        buf.put_u64_le(self.directory_offset);
        buf.put_u64_le(self.bitmaps_offset);
        buf.put_u64_le(self.key_table_offset);
        buf.put_u64_le(self.key_table_len);
        buf.put_u32_le(self.directory_crc32);

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        debug_assert_eq!(buf.len(), HEADER_LEN);
        buf.freeze()
    }

    /// Decode and validate a header against the size of the file it came from.
    pub fn decode(bytes: &[u8], file_len: u64) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(GeoMapError::corruption(format!(
                "header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let bytes = &bytes[..HEADER_LEN];

        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(GeoMapError::corruption("unrecognized magic bytes"));
        }

        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(GeoMapError::corruption(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let mut crc_bytes = &bytes[HEADER_CRC_OFFSET..];
        let stored_crc = crc_bytes.get_u32_le();
        if crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]) != stored_crc {
            return Err(GeoMapError::corruption("header checksum mismatch"));
        }

        let mut buf = &bytes[MAGIC.len() + 1..HEADER_CRC_OFFSET];
        let level_index_bucket_range = buf.get_u8();
        let min_level = buf.get_u8();
        let max_level = buf.get_u8();
        buf.advance(4);

        let header = Header {
            level_index_bucket_range,
            min_level,
            max_level,
            record_count: buf.get_u64_le(),
            bucket_count: buf.get_u64_le(),
            directory_offset: buf.get_u64_le(),
            bitmaps_offset: buf.get_u64_le(),
            key_table_offset: buf.get_u64_le(),
            key_table_len: buf.get_u64_le(),
            directory_crc32: buf.get_u32_le(),
        };
        header.validate(file_len)?;
        Ok(header)
    }

    fn validate(&self, file_len: u64) -> Result<()> {
        let range = self.level_index_bucket_range;
        if range == 0 {
            return Err(GeoMapError::corruption(format!(
                "invalid level index bucket range {}",
                range
            )));
        }

        if self.directory_offset != HEADER_LEN as u64 {
            return Err(GeoMapError::corruption("directory does not follow header"));
        }

        let directory_end = self
            .bucket_count
            .checked_mul(DIRECTORY_ENTRY_LEN as u64)
            .and_then(|len| len.checked_add(self.directory_offset));
        if directory_end != Some(self.bitmaps_offset) {
            return Err(GeoMapError::corruption(
                "bucket directory length does not match bucket count",
            ));
        }

        if self.key_table_offset < self.bitmaps_offset {
            return Err(GeoMapError::corruption("key table overlaps bitmap section"));
        }

        if self.key_table_offset.checked_add(self.key_table_len) != Some(file_len) {
            return Err(GeoMapError::corruption(format!(
                "section bounds do not match file length {}",
                file_len
            )));
        }

        let min_key_table = self.record_count.checked_mul(KEY_LEN_PREFIX as u64);
        if min_key_table.is_none_or(|min| self.key_table_len < min) {
            return Err(GeoMapError::corruption("key table shorter than record count"));
        }

        if (self.record_count == 0) != (self.bucket_count == 0) {
            return Err(GeoMapError::corruption(
                "record count and bucket count disagree",
            ));
        }

        if self.bucket_count > 0
            && (self.min_level > self.max_level || self.max_level > CellEntry::MAX_LEVEL)
        {
            return Err(GeoMapError::corruption(format!(
                "invalid stored level bounds {}..={}",
                self.min_level, self.max_level
            )));
        }

        Ok(())
    }
}

/// Location of one bucket bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub key: BucketKey,
    /// Offset within the bitmap section
    pub offset: u64,
    pub len: u64,
    /// CRC32 of the encoded bitmap
    pub crc32: u32,
}

impl DirectoryEntry {
    /// Entry for `blob`, stored at `offset` within the bitmap section.
    pub fn for_blob(key: BucketKey, offset: u64, blob: &[u8]) -> Self {
        Self {
            key,
            offset,
            len: blob.len() as u64,
            crc32: crc32fast::hash(blob),
        }
    }

    /// Reject a bitmap blob that does not match this entry.
    pub fn verify_blob(&self, blob: &[u8]) -> Result<()> {
        if blob.len() as u64 != self.len || crc32fast::hash(blob) != self.crc32 {
            return Err(GeoMapError::corruption(format!(
                "bucket ({}, {:#018x}) bitmap checksum mismatch",
                self.key.level_range, self.key.cell_id
            )));
        }
        Ok(())
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(self.key.level_range);
        buf.put_u64_le(self.key.cell_id);
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.len);
        buf.put_u32_le(self.crc32);
    }

    fn get(buf: &mut &[u8]) -> Self {
        let level_range = buf.get_u8();
        let cell_id = buf.get_u64_le();
        Self {
            key: BucketKey::new(level_range, cell_id),
            offset: buf.get_u64_le(),
            len: buf.get_u64_le(),
            crc32: buf.get_u32_le(),
        }
    }
}

/// Serialize directory entries in the given order.
pub fn encode_directory(entries: &[DirectoryEntry]) -> Bytes {
    let mut buf = BytesMut::with_capacity(entries.len() * DIRECTORY_ENTRY_LEN);
    for entry in entries {
        entry.put(&mut buf);
    }
    buf.freeze()
}

/// Decode and validate the bucket directory described by `header`.
pub fn decode_directory(bytes: &[u8], header: &Header) -> Result<Vec<DirectoryEntry>> {
    if bytes.len() as u64 != header.directory_len() {
        return Err(GeoMapError::corruption(format!(
            "bucket directory truncated: {} of {} bytes",
            bytes.len(),
            header.directory_len()
        )));
    }

    if crc32fast::hash(bytes) != header.directory_crc32 {
        return Err(GeoMapError::corruption("bucket directory checksum mismatch"));
    }

    let max_level_range = CellEntry::MAX_LEVEL / header.level_index_bucket_range;
    let bitmaps_len = header.bitmaps_len();
    let mut entries = Vec::with_capacity(header.bucket_count as usize);
    let mut buf = bytes;

    while buf.has_remaining() {
        let entry = DirectoryEntry::get(&mut buf);

        if entry.key.level_range > max_level_range {
            return Err(GeoMapError::corruption(format!(
                "bucket level range {} out of bounds",
                entry.key.level_range
            )));
        }

        if let Some(prev) = entries.last().map(|e: &DirectoryEntry| e.key)
            && prev >= entry.key
        {
            return Err(GeoMapError::corruption("bucket directory is not sorted"));
        }

        let end = entry.offset.checked_add(entry.len);
        if entry.len == 0 || end.is_none_or(|end| end > bitmaps_len) {
            return Err(GeoMapError::corruption(format!(
                "bucket bitmap out of bounds (offset {}, len {})",
                entry.offset, entry.len
            )));
        }

        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        let directory_len = 2 * DIRECTORY_ENTRY_LEN as u64;
        Header {
            level_index_bucket_range: 3,
            min_level: 10,
            max_level: 12,
            record_count: 2,
            bucket_count: 2,
            directory_offset: HEADER_LEN as u64,
            bitmaps_offset: HEADER_LEN as u64 + directory_len,
            key_table_offset: HEADER_LEN as u64 + directory_len + 40,
            key_table_len: 12,
            directory_crc32: 0,
        }
    }

    fn file_len(header: &Header) -> u64 {
        header.key_table_offset + header.key_table_len
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Header::decode(&bytes, file_len(&header)).unwrap(), header);
        assert_eq!(header.level_bounds(), Some((10, 12)));
    }

    #[test]
    fn test_header_accepts_wide_bucket_range() {
        let mut header = sample_header();
        header.level_index_bucket_range = u8::MAX;
        let bytes = header.encode();
        let decoded = Header::decode(&bytes, file_len(&header)).unwrap();
        assert_eq!(decoded.level_index_bucket_range, u8::MAX);

        header.level_index_bucket_range = 0;
        let bytes = header.encode();
        assert!(Header::decode(&bytes, file_len(&header)).unwrap_err().is_corruption());
    }

    #[test]
    fn test_header_rejects_bad_magic_and_version() {
        let header = sample_header();
        let mut bytes = header.encode().to_vec();
        bytes[0] = b'X';
        assert!(Header::decode(&bytes, file_len(&header)).unwrap_err().is_corruption());

        let mut bytes = header.encode().to_vec();
        bytes[8] = FORMAT_VERSION + 1;
        let err = Header::decode(&bytes, file_len(&header)).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_header_rejects_flipped_bit() {
        let header = sample_header();
        let mut bytes = header.encode().to_vec();
        bytes[20] ^= 0x01;
        let err = Header::decode(&bytes, file_len(&header)).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_header_rejects_wrong_file_length() {
        let header = sample_header();
        let bytes = header.encode();
        assert!(Header::decode(&bytes, file_len(&header) + 1).is_err());
        assert!(Header::decode(&bytes[..HEADER_LEN - 1], file_len(&header)).is_err());
    }

    #[test]
    fn test_directory_roundtrip_and_validation() {
        let entries = vec![
            DirectoryEntry {
                key: BucketKey::new(3, 100),
                offset: 0,
                len: 20,
                crc32: 7,
            },
            DirectoryEntry {
                key: BucketKey::new(4, 50),
                offset: 20,
                len: 20,
                crc32: 9,
            },
        ];
        let bytes = encode_directory(&entries);
        let mut header = sample_header();
        header.directory_crc32 = crc32fast::hash(&bytes);
        assert_eq!(decode_directory(&bytes, &header).unwrap(), entries);

        let unsorted = encode_directory(&[entries[1], entries[0]]);
        header.directory_crc32 = crc32fast::hash(&unsorted);
        let err = decode_directory(&unsorted, &header).unwrap_err();
        assert!(err.to_string().contains("sorted"));
    }

    #[test]
    fn test_directory_rejects_out_of_bounds_bitmap() {
        let entries = vec![
            DirectoryEntry {
                key: BucketKey::new(3, 100),
                offset: 0,
                len: 20,
                crc32: 7,
            },
            DirectoryEntry {
                key: BucketKey::new(3, 101),
                offset: 30,
                len: 20,
                crc32: 9,
            },
        ];
        let bytes = encode_directory(&entries);
        let mut header = sample_header();
        header.directory_crc32 = crc32fast::hash(&bytes);
        assert!(decode_directory(&bytes, &header).unwrap_err().is_corruption());
    }

    #[test]
    fn test_blob_checksum_catches_decodable_damage() {
        let blob = [1u8, 2, 3, 4];
        let entry = DirectoryEntry::for_blob(BucketKey::new(3, 100), 0, &blob);
        assert_eq!(entry.len, 4);
        assert!(entry.verify_blob(&blob).is_ok());

        let mut damaged = blob;
        damaged[3] ^= 0x10;
        let err = entry.verify_blob(&damaged).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("checksum"));
        assert!(entry.verify_blob(&blob[..3]).is_err());
    }
}

//! Key table: one opaque key per record, addressed by record id.
//!
//! Encoded as `record_count` consecutive `(len: u32 LE, bytes)` pairs. Record
//! ids are dense, so id `n` is the `n`-th entry.

use super::format::KEY_LEN_PREFIX;
use crate::bitmap::IdSet;
use crate::error::{GeoMapError, Result};
use bytes::{Buf, BufMut, Bytes};
use std::io::Write;

/// Accumulates keys in record id order.
#[derive(Debug, Default)]
pub struct KeyTableBuilder {
    keys: Vec<Bytes>,
    encoded_len: u64,
}

impl KeyTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key. Its position is the record id.
    pub fn push(&mut self, key: Bytes) {
        self.encoded_len += (KEY_LEN_PREFIX + key.len()) as u64;
        self.keys.push(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Size of the serialized table.
    pub fn encoded_len(&self) -> u64 {
        self.encoded_len
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut prefix = Vec::with_capacity(KEY_LEN_PREFIX);
        for key in &self.keys {
            let len = u32::try_from(key.len()).map_err(|_| {
                GeoMapError::invalid_argument(format!("key of {} bytes too long", key.len()))
            })?;
            prefix.clear();
            prefix.put_u32_le(len);
            out.write_all(&prefix)
                .and_then(|_| out.write_all(key))
                .map_err(|e| GeoMapError::io("write key table", e))?;
        }
        Ok(())
    }
}

/// Decoded key table.
///
/// Keys are zero-copy slices of the buffer the table was decoded from.
#[derive(Debug, Clone)]
pub struct KeyTable {
    keys: Vec<Bytes>,
}

impl KeyTable {
    /// Decode exactly `record_count` entries spanning all of `data`.
    pub fn decode(data: Bytes, record_count: u64) -> Result<Self> {
        let mut keys = Vec::with_capacity(record_count.min(data.len() as u64) as usize);
        let mut buf = data.clone();

        for id in 0..record_count {
            if buf.remaining() < KEY_LEN_PREFIX {
                return Err(GeoMapError::corruption(format!(
                    "key table truncated at record {}",
                    id
                )));
            }
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(GeoMapError::corruption(format!(
                    "key of record {} overruns key table",
                    id
                )));
            }
            keys.push(buf.split_to(len));
        }

        if buf.has_remaining() {
            return Err(GeoMapError::corruption(format!(
                "{} trailing bytes after key table",
                buf.remaining()
            )));
        }

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Bytes> {
        usize::try_from(id).ok().and_then(|i| self.keys.get(i))
    }

    /// Keys of `ids`, in ascending id order.
    pub fn resolve(&self, ids: &IdSet) -> Result<Vec<Bytes>> {
        ids.iter()
            .map(|id| {
                self.get(id).cloned().ok_or_else(|| {
                    GeoMapError::corruption(format!(
                        "record id {} outside key table of {} keys",
                        id,
                        self.keys.len()
                    ))
                })
            })
            .collect()
    }
}

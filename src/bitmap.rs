//! Record-id sets backed by 64-bit roaring bitmaps.

use crate::error::{GeoMapError, Result};
use roaring::RoaringTreemap;

/// Compressed set of record ids.
pub type IdSet = RoaringTreemap;

/// Append the portable serialization of `set` to `out`, returning the number of bytes written.
pub fn encode_into(set: &IdSet, out: &mut Vec<u8>) -> Result<u64> {
    let start = out.len();
    set.serialize_into(&mut *out)
        .map_err(|e| GeoMapError::io("encode bitmap", e))?;
    Ok((out.len() - start) as u64)
}

/// Decode a bitmap blob. Any decoding failure means the file is damaged.
pub fn decode(bytes: &[u8]) -> Result<IdSet> {
    IdSet::deserialize_from(bytes)
        .map_err(|e| GeoMapError::corruption(format!("undecodable bucket bitmap: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let set: IdSet = [0u64, 7, 1 << 40].into_iter().collect();
        let mut buf = vec![0xAA];
        let written = encode_into(&set, &mut buf).unwrap();
        assert_eq!(written as usize, buf.len() - 1);
        assert_eq!(decode(&buf[1..]).unwrap(), set);
    }

    #[test]
    fn test_decode_garbage_is_corruption() {
        let err = decode(&[0xFF, 0x01, 0x02]).unwrap_err();
        assert!(err.is_corruption());
    }
}

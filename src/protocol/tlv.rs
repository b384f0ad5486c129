// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Word-aligned type-length-value records.
//!
//! ```text
//!  0               2               4                               8
//! +---------------+---------------+-------------------------------+
//! |   reserved    |    type_id    |        length_in_bytes        |
//! +---------------+---------------+-------------------------------+
//! |  value ... (zero padded to the next multiple of 4 bytes)      |
//! +---------------------------------------------------------------+
//! ```
//!
//! A sequence of records is a plain concatenation; it ends where the
//! enclosing buffer ends.

use super::common::round_to_word;
use super::errors::Error;

/// Size of a TLV record header in bytes
pub const TLV_HEADER_SIZE: usize = 8;

/// Largest value that fits in a single record
pub const MAX_TLV_VALUE_SIZE: usize = u16::MAX as usize;

/// A TLV record borrowed from an enclosing buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvRef<'a> {
    pub type_id: u16,
    pub reserved: u16,
    pub value: &'a [u8],
}

impl<'a> TlvRef<'a> {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Number of bytes the record occupies in a word-aligned sequence
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + round_to_word(self.value.len())
    }

    /// Fail if the reserved header field is not zero
    pub fn check_reserved(&self) -> Result<(), Error> {
        if self.reserved != 0 {
            return Err(Error::Reserved(format!(
                "record 0x{:04x} has reserved field 0x{:04x}",
                self.type_id, self.reserved
            )));
        }
        Ok(())
    }

    pub fn to_tlv(&self) -> Tlv {
        Tlv {
            type_id: self.type_id,
            reserved: self.reserved,
            value: self.value.to_vec(),
        }
    }

    /// Read the value as a list of little-endian u16 words, as used by the
    /// format and type-id list records
    pub fn u16_list(&self) -> Vec<u16> {
        self.value
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}

/// An owned TLV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub type_id: u16,
    pub reserved: u16,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(type_id: u16, value: &[u8]) -> Self {
        Self {
            type_id,
            reserved: 0,
            value: value.to_vec(),
        }
    }

    pub fn as_tlv_ref(&self) -> TlvRef<'_> {
        TlvRef {
            type_id: self.type_id,
            reserved: self.reserved,
            value: &self.value,
        }
    }

    /// Serialise the record, zero padded to a word boundary
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(TLV_HEADER_SIZE + round_to_word(self.value.len()));
        write_record(&mut out, self.type_id, self.reserved, &self.value)?;
        Ok(out)
    }

    /// Decode the single record found at the start of `buf`
    pub fn decode(buf: &[u8]) -> Result<Tlv, Error> {
        let (r, _) = read_record(buf, 0)?;
        Ok(r.to_tlv())
    }
}

/// Lazy walk over a TLV sequence.
///
/// The walk never reads past the end of the buffer: a record whose declared
/// length overruns the buffer terminates the iteration, and
/// [`TlvIter::is_truncated`] reports it.  Cloning the iterator (or calling
/// [`iter`] again) restarts the walk from the same position.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    offset: usize,
    truncated: bool,
}

impl<'a> TlvIter<'a> {
    /// Offset of the next record to be read
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True once the walk stopped on a record running past the buffer, or on
    /// leftover bytes too short to hold a header
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = TlvRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }

        match read_record(self.buf, self.offset) {
            Ok((r, next)) => {
                self.offset = next;
                Some(r)
            }
            Err(_) => {
                self.truncated = true;
                self.offset = self.buf.len();
                None
            }
        }
    }
}

/// Walk the TLV sequence in `blob`
pub fn iter(blob: &[u8]) -> TlvIter<'_> {
    TlvIter {
        buf: blob,
        offset: 0,
        truncated: false,
    }
}

/// Split `blob` into its records, failing if the sequence does not end
/// exactly at the end of the buffer
pub fn split(blob: &[u8]) -> Result<Vec<TlvRef<'_>>, Error> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < blob.len() {
        let (r, next) = read_record(blob, offset)?;
        records.push(r);
        offset = next;
    }

    Ok(records)
}

/// Encode a single record with a zero reserved field
pub fn encode(type_id: u16, value: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    encode_into(&mut out, type_id, value)?;
    Ok(out)
}

/// Append a single record with a zero reserved field to `out`
pub fn encode_into(out: &mut Vec<u8>, type_id: u16, value: &[u8]) -> Result<(), Error> {
    write_record(out, type_id, 0, value)
}

fn write_record(out: &mut Vec<u8>, type_id: u16, reserved: u16, value: &[u8]) -> Result<(), Error> {
    if value.len() > MAX_TLV_VALUE_SIZE {
        return Err(Error::Bounds(format!(
            "record 0x{type_id:04x}: value of {} bytes exceeds {MAX_TLV_VALUE_SIZE}",
            value.len()
        )));
    }

    out.extend_from_slice(&reserved.to_le_bytes());
    out.extend_from_slice(&type_id.to_le_bytes());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
    out.resize(out.len() + round_to_word(value.len()) - value.len(), 0);

    Ok(())
}

// Returns the record at `offset` and the offset of the record following it.
// The padding of the very last record may be missing.
fn read_record(buf: &[u8], offset: usize) -> Result<(TlvRef<'_>, usize), Error> {
    let rest = buf.get(offset..).unwrap_or_default();

    if rest.len() < TLV_HEADER_SIZE {
        return Err(Error::Bounds(format!(
            "{} trailing bytes at offset {offset} cannot hold a record header",
            rest.len()
        )));
    }

    let reserved = u16::from_le_bytes([rest[0], rest[1]]);
    let type_id = u16::from_le_bytes([rest[2], rest[3]]);
    let length = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;

    let body = &rest[TLV_HEADER_SIZE..];

    if length > body.len() {
        return Err(Error::Bounds(format!(
            "record 0x{type_id:04x} at offset {offset} declares {length} bytes, {} available",
            body.len()
        )));
    }

    let consumed = (TLV_HEADER_SIZE + round_to_word(length)).min(rest.len());

    let r = TlvRef {
        type_id,
        reserved,
        value: &body[..length],
    };

    Ok((r, offset + consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encode_pads_to_word() {
        let b = encode(0x0009, &hex!("000102030405")).unwrap();

        assert_eq!(b, hex!("0000 0900 06000000 000102030405 0000").to_vec());
    }

    #[test]
    fn round_trip() {
        for n in [0usize, 1, 3, 4, 5, 64, 257] {
            let v: Vec<u8> = (0..n).map(|i| i as u8).collect();
            let b = encode(0x0102, &v).unwrap();

            assert_eq!(b.len() % 4, 0);

            let t = Tlv::decode(&b).unwrap();
            assert_eq!(t, Tlv::new(0x0102, &v));
            assert_eq!(t.reserved, 0);
        }
    }

    #[test]
    fn borrowed_view() {
        let t = Tlv::new(0x0100, &hex!("0002 0102"));
        let r = t.as_tlv_ref();

        assert_eq!(r.type_id, 0x0100);
        assert_eq!(r.u16_list(), vec![0x0200, 0x0201]);
        assert_eq!(r.encoded_len(), 12);
        assert_eq!(r.to_tlv(), t);
    }

    #[test]
    fn oversized_value_rejected() {
        let v = vec![0u8; MAX_TLV_VALUE_SIZE + 1];

        assert!(matches!(encode(1, &v), Err(Error::Bounds(_))));
    }

    #[test]
    fn iterate_is_restartable() {
        let mut blob = encode(0x0001, &hex!("0100")).unwrap();
        encode_into(&mut blob, 0x0008, &hex!("0030")).unwrap();
        encode_into(&mut blob, 0x0102, &hex!("010205")).unwrap();

        let it = iter(&blob);
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[2].value, &hex!("010205"));
        assert_eq!(split(&blob).unwrap(), first);
    }

    #[test]
    fn overrun_stops_cleanly() {
        let mut blob = encode(0x0001, &hex!("0100")).unwrap();
        // declares 0x20 bytes, carries 4
        blob.extend_from_slice(&hex!("0000 0200 20000000 deadbeef"));

        let mut it = iter(&blob);
        assert_eq!(it.next().map(|t| t.type_id), Some(0x0001));
        assert!(it.next().is_none());
        assert!(it.is_truncated());

        assert!(matches!(split(&blob), Err(Error::Bounds(_))));
    }

    #[test]
    fn short_trailer() {
        let mut blob = encode(0x0001, &[]).unwrap();
        blob.extend_from_slice(&hex!("000001"));

        assert_eq!(iter(&blob).count(), 1);
        assert!(split(&blob).is_err());
    }

    #[test]
    fn unpadded_last_record() {
        let blob = hex!("0000 0300 03000000 aabbcc");

        let v: Vec<_> = iter(&blob).collect();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].value, &hex!("aabbcc"));
    }

    #[test]
    fn reserved_reported() {
        let blob = hex!("0100 0100 00000000");
        let r = split(&blob).unwrap();

        assert!(matches!(r[0].check_reserved(), Err(Error::Reserved(_))));
    }

    #[test]
    fn empty_blob() {
        assert_eq!(iter(&[]).count(), 0);
        assert!(split(&[]).unwrap().is_empty());
    }
}

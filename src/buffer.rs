//! Bounded byte source with checked reads.
//!
//! Every read is bounds-checked against the slice the buffer was built from;
//! nothing here panics on short input.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order for multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read of {needed} bytes at offset {offset} exceeds buffer ({available} available)")]
pub struct BoundsError {
    pub offset: usize,
    pub needed: usize,
    pub available: usize,
}

/// Read-only view over captured bytes.
#[derive(Debug, Clone, Copy)]
pub struct Buffer<'a> {
    data: &'a [u8],
}

impl<'a> Buffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Buffer { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes available from `offset` to the end (0 when `offset` is past the end).
    pub fn remaining_from(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    /// Exactly `len` bytes at `offset`, or a [`BoundsError`].
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], BoundsError> {
        let err = BoundsError { offset, needed: len, available: self.remaining_from(offset) };
        let end = offset.checked_add(len).ok_or(err)?;
        self.data.get(offset..end).ok_or(err)
    }

    /// Up to `len` bytes at `offset`, clamped to what is actually present.
    pub fn bytes_clamped(&self, offset: usize, len: usize) -> &'a [u8] {
        let start = offset.min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, BoundsError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize, endianness: Endianness) -> Result<u16, BoundsError> {
        let b = self.bytes(offset, 2)?;
        Ok(match endianness {
            Endianness::Big => BigEndian::read_u16(b),
            Endianness::Little => LittleEndian::read_u16(b),
        })
    }

    pub fn read_u24(&self, offset: usize, endianness: Endianness) -> Result<u32, BoundsError> {
        let b = self.bytes(offset, 3)?;
        Ok(match endianness {
            Endianness::Big => BigEndian::read_u24(b),
            Endianness::Little => LittleEndian::read_u24(b),
        })
    }

    pub fn read_u32(&self, offset: usize, endianness: Endianness) -> Result<u32, BoundsError> {
        let b = self.bytes(offset, 4)?;
        Ok(match endianness {
            Endianness::Big => BigEndian::read_u32(b),
            Endianness::Little => LittleEndian::read_u32(b),
        })
    }

    /// Unsigned read of 1, 2, 3 or 4 bytes; other widths are rejected as out of bounds.
    pub fn read_uint(&self, offset: usize, len: usize, endianness: Endianness) -> Result<u32, BoundsError> {
        match len {
            1 => self.read_u8(offset).map(u32::from),
            2 => self.read_u16(offset, endianness).map(u32::from),
            3 => self.read_u24(offset, endianness),
            4 => self.read_u32(offset, endianness),
            _ => Err(BoundsError { offset, needed: len, available: self.remaining_from(offset) }),
        }
    }
}

/// Unsigned integer from a slice of 1..=4 bytes.
pub(crate) fn uint_from_slice(b: &[u8], endianness: Endianness) -> Option<u32> {
    match (b.len(), endianness) {
        (1, _) => Some(b[0] as u32),
        (2, Endianness::Big) => Some(BigEndian::read_u16(b) as u32),
        (2, Endianness::Little) => Some(LittleEndian::read_u16(b) as u32),
        (3, Endianness::Big) => Some(BigEndian::read_u24(b)),
        (3, Endianness::Little) => Some(LittleEndian::read_u24(b)),
        (4, Endianness::Big) => Some(BigEndian::read_u32(b)),
        (4, Endianness::Little) => Some(LittleEndian::read_u32(b)),
        _ => None,
    }
}

pub(crate) fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_out_of_range_reports_available() {
        let buf = Buffer::new(&[1, 2, 3]);
        let err = buf.bytes(2, 4).unwrap_err();
        assert_eq!(err.available, 1);
        assert_eq!(err.needed, 4);
        assert!(buf.bytes(3, 0).is_ok());
        assert!(buf.bytes(4, 0).is_err());
    }

    #[test]
    fn clamped_never_panics() {
        let buf = Buffer::new(&[1, 2, 3]);
        assert_eq!(buf.bytes_clamped(1, 10), &[2, 3]);
        assert!(buf.bytes_clamped(10, 10).is_empty());
        assert_eq!(buf.bytes_clamped(0, usize::MAX), &[1, 2, 3]);
    }

    #[test]
    fn reads_honor_endianness() {
        let buf = Buffer::new(&[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(buf.read_u16(0, Endianness::Big).unwrap(), 0x1234);
        assert_eq!(buf.read_u16(0, Endianness::Little).unwrap(), 0x3412);
        assert_eq!(buf.read_u24(1, Endianness::Big).unwrap(), 0x345678);
        assert_eq!(buf.read_u32(0, Endianness::Little).unwrap(), 0x78563412);
        assert!(buf.read_u32(1, Endianness::Big).is_err());
    }
}

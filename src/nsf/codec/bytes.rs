//! Bounds-checked little-endian cursor over an in-memory buffer.
//!
//! Every read either returns exactly the requested bytes or fails with
//! [`NsfError::Truncated`]; nothing is zero-filled or partially returned.

use byteorder::{ByteOrder, LittleEndian};

use crate::nsf::types::error::{NsfError, Result};

/// A cursor over a byte slice.
///
/// `base` is the absolute file offset of `data[0]`, so errors raised by a
/// reader over a note's bytes still name positions in the whole file.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position relative to the start of this reader.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position in the underlying file.
    pub fn absolute_position(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move the cursor to `pos` (relative to this reader).
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(self.truncated(pos.saturating_sub(self.data.len()) as u64, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Borrow `len` bytes at `offset` without moving the cursor.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.truncated(len as u64, offset))?;
        Ok(&self.data[offset..end])
    }

    /// A reader over `len` bytes at `offset`, keeping absolute positions.
    pub fn sub_reader(&self, offset: usize, len: usize) -> Result<ByteReader<'a>> {
        let data = self.slice(offset, len)?;
        Ok(ByteReader::with_base(data, self.base + offset as u64))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.slice(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read_bytes(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.read_bytes(8)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.read_bytes(8)?))
    }

    fn truncated(&self, requested: u64, at: usize) -> NsfError {
        NsfError::Truncated {
            offset: self.base.saturating_add(at as u64),
            requested,
            available: self.data.len().saturating_sub(at) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_integers() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xff];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_u8().unwrap(), 0xff);
        assert!(reader.is_empty());
    }

    #[test]
    fn overrun_is_truncated_not_partial() {
        let data = [1, 2, 3];
        let mut reader = ByteReader::with_base(&data, 0x100);
        reader.skip(2).unwrap();
        match reader.read_u32() {
            Err(NsfError::Truncated { offset, requested, available }) => {
                assert_eq!(offset, 0x102);
                assert_eq!(requested, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        // A failed read leaves the cursor where it was.
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read_u8().unwrap(), 3);
    }

    #[test]
    fn sub_reader_keeps_absolute_offsets() {
        let data = [0u8; 16];
        let outer = ByteReader::with_base(&data, 1000);
        let mut inner = outer.sub_reader(8, 4).unwrap();
        assert_eq!(inner.absolute_position(), 1008);
        inner.read_u32().unwrap();
        match inner.read_u8() {
            Err(NsfError::Truncated { offset, .. }) => assert_eq!(offset, 1012),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn seek_and_slice_are_bounded() {
        let data = [9u8; 8];
        let mut reader = ByteReader::new(&data);
        assert!(reader.seek(8).is_ok());
        assert!(reader.seek(9).is_err());
        assert!(reader.slice(4, 4).is_ok());
        assert!(reader.slice(5, 4).is_err());
        assert!(reader.slice(usize::MAX, 2).is_err());
    }
}

//! Bounds-checked big-endian reader over an in-memory buffer.

use crate::FormatError;

/// Read position over a borrowed byte buffer.
///
/// Every read either returns the requested value and advances, or fails
/// with [`FormatError::TruncatedData`] and leaves the position untouched.
/// Offsets in errors are absolute when the cursor was created with
/// [`ByteCursor::with_base`].
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Create a cursor whose first byte sits at file offset `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position relative to the start of this cursor's buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute file offset of the next byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let bytes = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        let [b] = self.take::<1>()?;
        Ok(b)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn read_u24_be(&mut self) -> Result<u32, FormatError> {
        let [b0, b1, b2] = self.take::<3>()?;
        Ok(u32::from_be_bytes([0, b0, b1, b2]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    /// Read a 4-byte chunk type tag.
    pub fn read_tag(&mut self) -> Result<[u8; 4], FormatError> {
        self.take()
    }

    /// Decode a base-128 variable-length quantity.
    ///
    /// Bit 7 of each byte flags continuation; the 7-bit payloads are
    /// concatenated most significant group first. Stops on the first byte
    /// with bit 7 clear.
    pub fn read_vlq(&mut self) -> Result<u32, FormatError> {
        let start = self.pos;
        let mut value: u32 = 0;
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                self.pos = start;
                return Err(FormatError::MalformedVarInt {
                    offset: self.base + start,
                });
            };
            self.pos += 1;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if len > self.remaining() {
            return Err(FormatError::TruncatedData {
                offset: self.offset(),
                needed: len,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Advance past `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        self.read_slice(len).map(|_| ())
    }
}

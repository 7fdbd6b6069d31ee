//! Big-endian cursor over a byte slice, shared by the disk and wire codecs.

use crate::chunk_serial::ChunkCodecError;

/// Reads big-endian primitives, failing with [`ChunkCodecError::Truncated`]
/// instead of panicking when input runs short.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current offset from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Borrows the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ChunkCodecError> {
        if self.remaining() < len {
            return Err(ChunkCodecError::Truncated {
                expected: len,
                actual: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ChunkCodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, ChunkCodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads one signed byte.
    pub fn read_i8(&mut self) -> Result<i8, ChunkCodecError> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, ChunkCodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, ChunkCodecError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, ChunkCodecError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, ChunkCodecError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian IEEE 754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32, ChunkCodecError> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

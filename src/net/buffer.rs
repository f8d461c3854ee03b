//! Packet buffer implementation
//!
//! Provides a byte buffer with the read/write operations used by the entity
//! packet codec:
//! - Standard big-endian integer types (byte, short, int, long)
//! - UUIDs as two longs
//! - Length-prefixed strings
//! - Checked reads that report truncation instead of returning zeroes

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::protocol::packets::PacketDecodeError;

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;

/// Packet buffer for reading and writing protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
        }
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes into an immutable buffer
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Ensure `count` bytes can be read
    fn require(&self, count: usize) -> Result<(), PacketDecodeError> {
        if self.remaining() < count {
            return Err(PacketDecodeError::InsufficientData {
                expected: count,
                actual: self.remaining(),
            });
        }
        Ok(())
    }

    // ============ Reading Methods (Big-Endian) ============

    /// Read an unsigned byte
    pub fn read_ubyte(&mut self) -> Result<u8, PacketDecodeError> {
        self.require(1)?;
        let value = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(value)
    }

    /// Read an unsigned big-endian short (2 bytes)
    pub fn read_ushort(&mut self) -> Result<u16, PacketDecodeError> {
        self.require(2)?;
        let bytes = [self.data[self.read_pos], self.data[self.read_pos + 1]];
        self.read_pos += 2;
        Ok(u16::from_be_bytes(bytes))
    }

    /// Read a signed big-endian int (4 bytes)
    pub fn read_int(&mut self) -> Result<i32, PacketDecodeError> {
        self.require(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.read_pos..self.read_pos + 4]);
        self.read_pos += 4;
        Ok(i32::from_be_bytes(bytes))
    }

    /// Read an unsigned big-endian int (4 bytes)
    pub fn read_uint(&mut self) -> Result<u32, PacketDecodeError> {
        self.read_int().map(|v| v as u32)
    }

    /// Read an unsigned big-endian long (8 bytes)
    pub fn read_ulong(&mut self) -> Result<u64, PacketDecodeError> {
        self.require(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[self.read_pos..self.read_pos + 8]);
        self.read_pos += 8;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Read a UUID written as two big-endian longs
    pub fn read_uuid(&mut self) -> Result<Uuid, PacketDecodeError> {
        let high = self.read_ulong()?;
        let low = self.read_ulong()?;
        Ok(Uuid::from_u64_pair(high, low))
    }

    /// Read a string prefixed by an unsigned short length
    pub fn read_string(&mut self) -> Result<String, PacketDecodeError> {
        let length = self.read_ushort()? as usize;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes).map_err(|_| PacketDecodeError::InvalidValue {
            field: "string".to_string(),
            value: "invalid utf-8".to_string(),
        })
    }

    /// Read a number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, PacketDecodeError> {
        self.require(length)?;
        let bytes = self.data[self.read_pos..self.read_pos + length].to_vec();
        self.read_pos += length;
        Ok(bytes)
    }

    // ============ Writing Methods (Big-Endian) ============

    /// Write an unsigned byte
    pub fn write_ubyte(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write an unsigned big-endian short
    pub fn write_ushort(&mut self, value: u16) {
        self.data.put_u16(value);
    }

    /// Write a signed big-endian int
    pub fn write_int(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write an unsigned big-endian int
    pub fn write_uint(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    /// Write an unsigned big-endian long
    pub fn write_ulong(&mut self, value: u64) {
        self.data.put_u64(value);
    }

    /// Write a UUID as two big-endian longs
    pub fn write_uuid(&mut self, value: &Uuid) {
        let (high, low) = value.as_u64_pair();
        self.write_ulong(high);
        self.write_ulong(low);
    }

    /// Write a string prefixed by an unsigned short length
    pub fn write_string(&mut self, value: &str) {
        self.write_string_limited(value, u16::MAX as usize);
    }

    /// Write a string cut to at most `max_len` bytes on a char boundary
    pub fn write_string_limited(&mut self, value: &str, max_len: usize) {
        let value = truncate_utf8(value, max_len.min(u16::MAX as usize));
        self.write_ushort(value.len() as u16);
        self.write_bytes(value.as_bytes());
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }
}

/// Longest prefix of `value` that fits in `max_len` bytes
pub fn truncate_utf8(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

impl From<&[u8]> for PacketBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

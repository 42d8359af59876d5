//! Growable byte buffer with cursor-based read and write.
//!
//! `ByteBuf` is the toolchain's shared serialization primitive: the
//! assembler writes opcode and operand bytes through it, the disassembler
//! and emulator read them back through the same cursor. All multi-byte
//! values are little-endian regardless of host, so binaries are portable
//! across the three tools on any machine.
//!
//! Reading past the end yields [`BufError::OutOfRange`], a recoverable
//! error that doubles as the loop terminator for stream consumers. Writes
//! cannot fail; the backing storage grows geometrically (next power of two
//! at or above the required size) and never drops bytes already written.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Errors reported by [`ByteBuf`] operations.
#[derive(Debug, Error)]
pub enum BufError {
    /// A read of `want` bytes at `pos` would pass the end of the stream.
    #[error("read of {want} byte(s) at position {pos} is out of range (length {len})")]
    OutOfRange { pos: usize, want: usize, len: usize },

    /// A seek target past the end of the stream.
    #[error("seek to {pos} is past the end of the stream (length {len})")]
    BadSeek { pos: usize, len: usize },

    /// A hashed container whose stored hash does not match its payload.
    #[error("integrity hash mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    HashMismatch { stored: u32, computed: u32 },

    /// A hashed container shorter than its 4-byte hash header.
    #[error("hashed container shorter than its 4-byte header")]
    MissingHash,
}

/// An owned, growable byte store with a single cursor used for both
/// writing (assembly) and reading (disassembly, execution).
#[derive(Debug, Default)]
pub struct ByteBuf {
    data: Vec<u8>,
    pos: usize,
}

impl ByteBuf {
    /// Create an empty buffer with the cursor at 0.
    pub fn new() -> ByteBuf {
        ByteBuf::default()
    }

    /// Wrap existing bytes for reading, cursor at 0.
    pub fn from_bytes(data: Vec<u8>) -> ByteBuf {
        ByteBuf { data, pos: 0 }
    }

    /// Current cursor position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Number of bytes in the stream.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the stream holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The stream contents, independent of the cursor.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, yielding the stream contents.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Move the cursor back to 0, keeping contents and allocation. This is
    /// the assembler's reset between its two passes: pass 2 overwrites the
    /// identically-sized output of pass 1 in place.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Move the cursor to an absolute position within the stream.
    pub fn seek(&mut self, pos: usize) -> Result<(), BufError> {
        if pos > self.data.len() {
            return Err(BufError::BadSeek {
                pos,
                len: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn grow_to(&mut self, required: usize) {
        if required > self.data.capacity() {
            let target = required.next_power_of_two();
            self.data.reserve(target - self.data.len());
        }
        if required > self.data.len() {
            self.data.resize(required, 0);
        }
    }

    /// Write raw bytes at the cursor, overwriting in place inside the
    /// stream and appending past its end.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.grow_to(self.pos + bytes.len());
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut bytes = [0u8; 8];
        LittleEndian::write_f64(&mut bytes, value);
        self.write_bytes(&bytes);
    }

    fn take(&mut self, want: usize) -> Result<&[u8], BufError> {
        if self.pos + want > self.data.len() {
            return Err(BufError::OutOfRange {
                pos: self.pos,
                want,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + want];
        self.pos += want;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, BufError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BufError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, BufError> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }
}

// ---------------------------------------------------------------------------
// Hashed container (opt-in)
// ---------------------------------------------------------------------------

/// 32-bit FNV-1a over a byte slice.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

impl ByteBuf {
    /// Unwrap a hashed container: a 4-byte little-endian FNV-1a hash of the
    /// payload, followed by the payload itself. The baseline binary format
    /// is the bare stream; this wrapper is an opt-in integrity check.
    pub fn from_hashed_bytes(raw: Vec<u8>) -> Result<ByteBuf, BufError> {
        if raw.len() < 4 {
            return Err(BufError::MissingHash);
        }
        let stored = LittleEndian::read_u32(&raw[..4]);
        let computed = fnv1a(&raw[4..]);
        if stored != computed {
            return Err(BufError::HashMismatch { stored, computed });
        }
        Ok(ByteBuf::from_bytes(raw[4..].to_vec()))
    }

    /// Produce the hashed-container encoding of the stream contents.
    pub fn to_hashed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 4);
        let mut header = [0u8; 4];
        LittleEndian::write_u32(&mut header, fnv1a(&self.data));
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.data);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_writes_then_reads() {
        let mut buf = ByteBuf::new();
        buf.write_u8(0x0A);
        buf.write_f64(1.5);
        buf.write_u16(0x1234);
        assert_eq!(buf.len(), 11);

        buf.rewind();
        assert_eq!(buf.read_u8().unwrap(), 0x0A);
        assert_eq!(buf.read_f64().unwrap(), 1.5);
        assert_eq!(buf.read_u16().unwrap(), 0x1234);
        assert_eq!(buf.pos(), 11);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let mut buf = ByteBuf::from_bytes(vec![1]);
        assert_eq!(buf.read_u8().unwrap(), 1);
        match buf.read_u8() {
            Err(BufError::OutOfRange { pos: 1, want: 1, len: 1 }) => {}
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        // A partial operand is also out of range, reported at its start.
        buf.rewind();
        assert!(matches!(
            buf.read_u16(),
            Err(BufError::OutOfRange { pos: 0, want: 2, len: 1 })
        ));
    }

    #[test]
    fn growth_keeps_earlier_bytes() {
        let mut buf = ByteBuf::new();
        for i in 0..10_000u32 {
            buf.write_u8((i % 251) as u8);
        }
        assert_eq!(buf.len(), 10_000);
        buf.rewind();
        for i in 0..10_000u32 {
            assert_eq!(buf.read_u8().unwrap(), (i % 251) as u8);
        }
    }

    #[test]
    fn rewind_overwrites_in_place() {
        let mut buf = ByteBuf::new();
        buf.write_u16(0xAAAA);
        buf.rewind();
        buf.write_u16(0xBBBB);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.bytes(), &[0xBB, 0xBB]);
    }

    #[test]
    fn seek_bounds() {
        let mut buf = ByteBuf::from_bytes(vec![0; 4]);
        assert!(buf.seek(4).is_ok()); // seeking to the end is allowed
        assert!(matches!(buf.seek(5), Err(BufError::BadSeek { pos: 5, len: 4 })));
    }

    #[test]
    fn hashed_container_round_trip() {
        let mut buf = ByteBuf::new();
        buf.write_f64(3.25);
        let wrapped = buf.to_hashed_bytes();
        let unwrapped = ByteBuf::from_hashed_bytes(wrapped).unwrap();
        assert_eq!(unwrapped.bytes(), buf.bytes());
    }

    #[test]
    fn hashed_container_detects_corruption() {
        let mut buf = ByteBuf::new();
        buf.write_f64(3.25);
        let mut wrapped = buf.to_hashed_bytes();
        wrapped[7] ^= 0x01;
        assert!(matches!(
            ByteBuf::from_hashed_bytes(wrapped),
            Err(BufError::HashMismatch { .. })
        ));
        assert!(matches!(
            ByteBuf::from_hashed_bytes(vec![1, 2]),
            Err(BufError::MissingHash)
        ));
    }
}

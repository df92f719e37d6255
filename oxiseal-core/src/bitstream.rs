//! Bit-level I/O for DEFLATE streams.
//!
//! Bits are packed LSB-first as RFC 1951 requires. Entry payloads are
//! always fully staged in memory before inflation, so both sides work on
//! byte slices and vectors instead of generic streams.

use crate::error::{OxiSealError, Result};

/// A bit-level reader over a byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Next byte of `data` to load into the buffer.
    pos: usize,
    /// Bit buffer (LSB-first).
    buffer: u64,
    bits_in_buffer: u8,
    bits_consumed: u64,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            bits_in_buffer: 0,
            bits_consumed: 0,
        }
    }

    /// Current bit position (for error reporting).
    pub fn bit_position(&self) -> u64 {
        self.bits_consumed
    }

    /// Bits still available, including those already buffered.
    pub fn remaining_bits(&self) -> u64 {
        self.bits_in_buffer as u64 + ((self.data.len() - self.pos) as u64) * 8
    }

    fn refill(&mut self) {
        while self.bits_in_buffer <= 56 && self.pos < self.data.len() {
            self.buffer |= (self.data[self.pos] as u64) << self.bits_in_buffer;
            self.pos += 1;
            self.bits_in_buffer += 8;
        }
    }

    fn ensure_bits(&mut self, count: u8) -> Result<()> {
        if self.bits_in_buffer < count {
            self.refill();
            if self.bits_in_buffer < count {
                let missing = (count - self.bits_in_buffer) as usize;
                return Err(OxiSealError::unexpected_eof(missing.div_ceil(8)));
            }
        }
        Ok(())
    }

    /// Read up to 32 bits, first bit read in the LSB position.
    #[inline]
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        let value = self.peek_bits(count)?;
        self.consume(count);
        Ok(value)
    }

    /// Peek at up to 32 bits without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        self.ensure_bits(count)?;
        let mask = if count == 32 {
            u32::MAX as u64
        } else {
            (1u64 << count) - 1
        };
        Ok((self.buffer & mask) as u32)
    }

    /// Peek at up to `count` bits, zero-padding past the end of input.
    ///
    /// Returns the bits and how many of them are real.
    pub fn peek_bits_lossy(&mut self, count: u8) -> (u32, u8) {
        self.refill();
        let available = self.bits_in_buffer.min(count);
        let mask = if available == 0 {
            0
        } else {
            (1u64 << available) - 1
        };
        ((self.buffer & mask) as u32, available)
    }

    /// Skip bits already known to be buffered.
    #[inline]
    pub fn consume(&mut self, count: u8) {
        debug_assert!(count <= self.bits_in_buffer);
        self.buffer >>= count;
        self.bits_in_buffer -= count;
        self.bits_consumed += count as u64;
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Discard partial bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let discard = self.bits_in_buffer % 8;
        self.consume(discard);
    }

    /// Read whole bytes; the reader must be byte-aligned.
    pub fn read_bytes(&mut self, out: &mut Vec<u8>, len: usize) -> Result<()> {
        debug_assert!(self.bits_in_buffer % 8 == 0);
        let mut remaining = len;
        while remaining > 0 && self.bits_in_buffer >= 8 {
            out.push((self.buffer & 0xFF) as u8);
            self.consume(8);
            remaining -= 1;
        }
        let end = self.pos + remaining;
        if end > self.data.len() {
            return Err(OxiSealError::unexpected_eof(end - self.data.len()));
        }
        out.extend_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        self.bits_consumed += remaining as u64 * 8;
        Ok(())
    }
}

/// A bit-level writer appending to a byte vector.
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    buffer: u64,
    bits_in_buffer: u8,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `capacity` output bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Write the low `count` bits of `value` (up to 32), LSB-first.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let masked = if count == 32 {
            value as u64
        } else {
            (value as u64) & ((1u64 << count) - 1)
        };
        self.buffer |= masked << self.bits_in_buffer;
        self.bits_in_buffer += count;
        while self.bits_in_buffer >= 8 {
            self.out.push((self.buffer & 0xFF) as u8);
            self.buffer >>= 8;
            self.bits_in_buffer -= 8;
        }
    }

    /// Write a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u32, 1);
    }

    /// Pad with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.bits_in_buffer > 0 {
            let pad = 8 - self.bits_in_buffer;
            self.write_bits(0, pad);
        }
    }

    /// Append whole bytes; the writer must be byte-aligned.
    pub fn write_bytes(&mut self, data: &[u8]) {
        debug_assert!(self.bits_in_buffer == 0);
        self.out.extend_from_slice(data);
    }

    /// Flush the trailing partial byte and return the output.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.out
    }
}

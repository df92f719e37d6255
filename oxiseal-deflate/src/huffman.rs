//! Canonical Huffman decoding for DEFLATE.
//!
//! Codes of up to [`HuffmanTable::FAST_BITS`] bits resolve with a single
//! table lookup; longer codes are walked one bit at a time using the
//! per-length counts.

use oxiseal_core::BitReader;
use oxiseal_core::error::{OxiSealError, Result};

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Decoding table for one canonical Huffman code.
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    /// Number of codes of each length.
    counts: [u16; MAX_CODE_LENGTH + 1],
    /// Symbols ordered by (code length, symbol value).
    symbols: Vec<u16>,
    /// `symbol << 4 | length` indexed by bit-reversed code prefix; 0 = miss.
    fast: Vec<u16>,
}

impl HuffmanTable {
    /// Number of bits resolved by the lookup table.
    pub const FAST_BITS: u8 = 9;

    /// Build a table from per-symbol code lengths (0 = symbol unused).
    ///
    /// Incomplete codes are accepted since a single-symbol distance code is
    /// legal; over-subscribed codes are rejected.
    pub fn from_code_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(OxiSealError::invalid_header(format!(
                    "Code length {} exceeds maximum {}",
                    len, MAX_CODE_LENGTH
                )));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(OxiSealError::invalid_header("Over-subscribed Huffman code"));
            }
        }

        let mut offsets = [0u16; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; offsets[MAX_CODE_LENGTH + 1] as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
        let mut code = 0u16;
        for len in 1..=MAX_CODE_LENGTH {
            code = (code + counts[len - 1]) << 1;
            next_code[len] = code;
        }

        let fast_size = 1usize << Self::FAST_BITS;
        let mut fast = vec![0u16; fast_size];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            if len > Self::FAST_BITS {
                continue;
            }
            let reversed = reverse_bits(code, len) as usize;
            let entry = ((symbol as u16) << 4) | len as u16;
            let mut index = reversed;
            while index < fast_size {
                fast[index] = entry;
                index += 1 << len;
            }
        }

        Ok(Self {
            counts,
            symbols,
            fast,
        })
    }

    /// Decode one symbol.
    #[inline]
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let (bits, available) = reader.peek_bits_lossy(Self::FAST_BITS);
        let entry = self.fast[bits as usize];
        let len = (entry & 0x0F) as u8;
        if len != 0 && len <= available {
            reader.consume(len);
            return Ok(entry >> 4);
        }
        self.decode_slow(reader)
    }

    fn decode_slow(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let start = reader.bit_position();
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_LENGTH {
            code |= reader.read_bits(1)? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(OxiSealError::invalid_huffman(start))
    }
}

/// Reverse the low `len` bits of `code`.
pub fn reverse_bits(code: u16, len: u8) -> u16 {
    code.reverse_bits() >> (16 - len as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiseal_core::BitWriter;

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b001, 3), 0b100);
        assert_eq!(reverse_bits(0b1101, 4), 0b1011);
        assert_eq!(reverse_bits(0x30, 8), 0x0C);
    }

    #[test]
    fn test_decode_simple_code() {
        // A=0, B=10, C=110, D=111
        let table = HuffmanTable::from_code_lengths(&[1, 2, 3, 3]).unwrap();
        let mut writer = BitWriter::new();
        for (code, len) in [(0b0, 1), (0b10, 2), (0b110, 3), (0b111, 3)] {
            writer.write_bits(reverse_bits(code, len) as u32, len);
        }
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let decoded: Vec<u16> = (0..4).map(|_| table.decode(&mut reader).unwrap()).collect();
        assert_eq!(decoded, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_long_codes_use_slow_path() {
        // Lengths 1..=12 plus one more 12-bit code form a complete code.
        let mut lengths: Vec<u8> = (1..=12).collect();
        lengths.push(12);
        let table = HuffmanTable::from_code_lengths(&lengths).unwrap();

        // The last symbol has code 111111111111 (12 ones).
        let mut writer = BitWriter::new();
        writer.write_bits(0xFFF, 12);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(table.decode(&mut reader).unwrap(), 12);
    }

    #[test]
    fn test_oversubscribed_rejected() {
        assert!(HuffmanTable::from_code_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn test_length_above_maximum_rejected() {
        assert!(HuffmanTable::from_code_lengths(&[16, 1]).is_err());
    }

    #[test]
    fn test_empty_code_fails_to_decode() {
        let table = HuffmanTable::from_code_lengths(&[0, 0, 0]).unwrap();
        let bytes = [0xFFu8, 0xFF];
        let mut reader = BitReader::new(&bytes);
        assert!(table.decode(&mut reader).is_err());
    }
}

//! DEFLATE compression.
//!
//! Input is cut into segments of at most 65 535 bytes. Each segment is
//! tokenized with the shared [`MatchFinder`] and emitted either as a fixed
//! Huffman block or as a stored block, whichever is smaller. Already
//! compressed or encrypted payloads therefore never grow by more than the
//! stored-block framing.

use crate::huffman::reverse_bits;
use crate::lz77::{Lz77Token, MatchFinder};
use crate::tables::{END_OF_BLOCK, distance_symbol, fixed_litlen_code, length_symbol};
use oxiseal_core::BitWriter;
use oxiseal_core::error::{OxiSealError, Result};

/// Largest payload of a stored block.
const SEGMENT_SIZE: usize = 65_535;

/// Default compression level.
pub const DEFAULT_LEVEL: u8 = 6;

/// DEFLATE compressor.
#[derive(Debug, Clone, Copy)]
pub struct Deflater {
    level: u8,
}

impl Deflater {
    /// Create a compressor; `level` must be 0..=9 (0 = stored blocks only).
    pub fn new(level: u8) -> Result<Self> {
        if level > 9 {
            return Err(OxiSealError::invalid_parameter(format!(
                "compression level {} outside 0..=9",
                level
            )));
        }
        Ok(Self { level })
    }

    /// Compression level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Compress `data` into a complete DEFLATE stream.
    pub fn compress(&self, data: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(data.len() / 2 + 64);

        if data.is_empty() {
            write_fixed_block(&mut writer, &[], true);
            return writer.finish();
        }

        let mut finder = (self.level > 0).then(|| MatchFinder::new(self.level));
        let mut tokens = Vec::new();
        let mut start = 0;
        while start < data.len() {
            let end = (start + SEGMENT_SIZE).min(data.len());
            let is_final = end == data.len();
            let segment = &data[start..end];

            match finder.as_mut() {
                Some(finder) => {
                    tokens.clear();
                    finder.tokenize(data, start, end, &mut tokens);
                    // Worst-case stored cost: header, alignment padding, LEN/NLEN.
                    let stored_bits = 3 + 7 + 32 + 8 * segment.len() as u64;
                    if fixed_block_bits(&tokens) <= stored_bits {
                        write_fixed_block(&mut writer, &tokens, is_final);
                    } else {
                        write_stored_block(&mut writer, segment, is_final);
                    }
                }
                None => write_stored_block(&mut writer, segment, is_final),
            }
            start = end;
        }

        writer.finish()
    }
}

impl Default for Deflater {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
        }
    }
}

fn write_stored_block(writer: &mut BitWriter, segment: &[u8], is_final: bool) {
    let len = segment.len() as u16;
    writer.write_bit(is_final);
    writer.write_bits(0, 2);
    writer.align_to_byte();
    writer.write_bits(len as u32, 16);
    writer.write_bits(!len as u32, 16);
    writer.write_bytes(segment);
}

#[inline]
fn write_litlen(writer: &mut BitWriter, symbol: u16) {
    let (code, len) = fixed_litlen_code(symbol);
    writer.write_bits(reverse_bits(code, len) as u32, len);
}

fn write_fixed_block(writer: &mut BitWriter, tokens: &[Lz77Token], is_final: bool) {
    writer.write_bit(is_final);
    writer.write_bits(1, 2);
    for token in tokens {
        match *token {
            Lz77Token::Literal(byte) => write_litlen(writer, byte as u16),
            Lz77Token::Match { length, distance } => {
                let (symbol, extra_bits, extra) = length_symbol(length);
                write_litlen(writer, symbol);
                writer.write_bits(extra as u32, extra_bits);

                let (symbol, extra_bits, extra) = distance_symbol(distance);
                writer.write_bits(reverse_bits(symbol, 5) as u32, 5);
                writer.write_bits(extra as u32, extra_bits);
            }
        }
    }
    write_litlen(writer, END_OF_BLOCK);
}

fn fixed_block_bits(tokens: &[Lz77Token]) -> u64 {
    let body: u64 = tokens
        .iter()
        .map(|token| match *token {
            Lz77Token::Literal(byte) => fixed_litlen_code(byte as u16).1 as u64,
            Lz77Token::Match { length, distance } => {
                let (symbol, length_extra, _) = length_symbol(length);
                let (_, distance_extra, _) = distance_symbol(distance);
                (fixed_litlen_code(symbol).1 + length_extra + 5 + distance_extra) as u64
            }
        })
        .sum();
    3 + body + 7
}

/// Compress data at the given level (0..=9).
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    Ok(Deflater::new(level)?.compress(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::inflate;

    #[test]
    fn test_empty_input_is_single_fixed_block() {
        assert_eq!(deflate(b"", 6).unwrap(), vec![0x03, 0x00]);
    }

    #[test]
    fn test_fixed_block_matches_reference_encoder() {
        // zlib emits the same bytes for a lone literal.
        assert_eq!(deflate(b"a", 6).unwrap(), vec![0x4B, 0x04, 0x00]);
    }

    #[test]
    fn test_level_zero_is_stored() {
        let compressed = deflate(b"Hello", 0).unwrap();
        assert_eq!(
            compressed,
            vec![0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn test_invalid_level() {
        assert!(deflate(b"x", 10).is_err());
    }

    #[test]
    fn test_text_compresses() {
        let input = b"the class loader loads the class ".repeat(50);
        let compressed = deflate(&input, 6).unwrap();
        assert!(compressed.len() < input.len() / 4);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }

    #[test]
    fn test_incompressible_falls_back_to_stored() {
        // xorshift noise
        let mut state = 0x2545F491u32;
        let input: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let compressed = deflate(&input, 9).unwrap();
        assert!(compressed.len() <= input.len() + 5);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }

    #[test]
    fn test_multiple_segments() {
        let input: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        for level in [0, 1, 6, 9] {
            let compressed = deflate(&input, level).unwrap();
            assert_eq!(inflate(&compressed).unwrap(), input, "level {}", level);
        }
    }
}

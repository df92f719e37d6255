//! DEFLATE decompression (inflate).
//!
//! Supports all three block types of RFC 1951:
//! - Type 0: Stored (uncompressed)
//! - Type 1: Fixed Huffman codes
//! - Type 2: Dynamic Huffman codes
//!
//! The whole output stays in memory, so back-references resolve directly
//! against the output vector.

use crate::huffman::HuffmanTable;
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, END_OF_BLOCK, LENGTH_BASE,
    LENGTH_EXTRA_BITS, fixed_distance_table, fixed_litlen_table,
};
use oxiseal_core::BitReader;
use oxiseal_core::error::{OxiSealError, Result};

/// DEFLATE decompressor.
#[derive(Debug, Default)]
pub struct Inflater {
    output: Vec<u8>,
    /// Upper bound on the output size, if known.
    limit: Option<usize>,
}

impl Inflater {
    /// Create a decompressor with no output limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decompressor that fails once output exceeds `limit` bytes.
    ///
    /// The buffer is preallocated to `limit` (capped at 16 MiB).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            output: Vec::with_capacity(limit.min(16 << 20)),
            limit: Some(limit),
        }
    }

    /// Decompress a complete DEFLATE stream.
    pub fn inflate(mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader = BitReader::new(data);
        loop {
            let is_final = reader.read_bit()?;
            match reader.read_bits(2)? {
                0 => self.inflate_stored(&mut reader)?,
                1 => {
                    let litlen = fixed_litlen_table()?;
                    let distance = fixed_distance_table()?;
                    self.inflate_huffman(&mut reader, litlen, distance)?
                }
                2 => self.inflate_dynamic(&mut reader)?,
                _ => return Err(OxiSealError::invalid_header("Reserved block type 3")),
            }
            if is_final {
                return Ok(self.output);
            }
        }
    }

    fn check_limit(&self, extra: usize, reader: &BitReader<'_>) -> Result<()> {
        match self.limit {
            Some(limit) if self.output.len() + extra > limit => Err(OxiSealError::corrupted(
                reader.bit_position() / 8,
                format!("output exceeds declared size {}", limit),
            )),
            _ => Ok(()),
        }
    }

    fn inflate_stored(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        reader.align_to_byte();
        let len = reader.read_bits(16)? as u16;
        let nlen = reader.read_bits(16)? as u16;
        if len != !nlen {
            return Err(OxiSealError::corrupted(
                reader.bit_position() / 8,
                format!("LEN/NLEN mismatch: {} vs {}", len, !nlen),
            ));
        }
        self.check_limit(len as usize, reader)?;
        reader.read_bytes(&mut self.output, len as usize)
    }

    fn inflate_dynamic(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        let hlit = reader.read_bits(5)? as usize + 257;
        let hdist = reader.read_bits(5)? as usize + 1;
        let hclen = reader.read_bits(4)? as usize + 4;

        let mut code_length_lengths = [0u8; 19];
        for &slot in &CODE_LENGTH_ORDER[..hclen] {
            code_length_lengths[slot] = reader.read_bits(3)? as u8;
        }
        let code_length_table = HuffmanTable::from_code_lengths(&code_length_lengths)?;

        let total = hlit + hdist;
        let mut lengths = Vec::with_capacity(total);
        while lengths.len() < total {
            let symbol = code_length_table.decode(reader)?;
            let (value, repeat) = match symbol {
                0..=15 => (symbol as u8, 1),
                16 => {
                    let prev = *lengths.last().ok_or_else(|| {
                        OxiSealError::corrupted(
                            reader.bit_position() / 8,
                            "repeat code with no previous length",
                        )
                    })?;
                    (prev, reader.read_bits(2)? as usize + 3)
                }
                17 => (0, reader.read_bits(3)? as usize + 3),
                18 => (0, reader.read_bits(7)? as usize + 11),
                _ => return Err(OxiSealError::invalid_huffman(reader.bit_position())),
            };
            if lengths.len() + repeat > total {
                return Err(OxiSealError::corrupted(
                    reader.bit_position() / 8,
                    "code lengths overflow alphabet",
                ));
            }
            lengths.resize(lengths.len() + repeat, value);
        }

        if lengths[END_OF_BLOCK as usize] == 0 {
            return Err(OxiSealError::corrupted(
                reader.bit_position() / 8,
                "no code for end-of-block",
            ));
        }

        let litlen = HuffmanTable::from_code_lengths(&lengths[..hlit])?;
        let distance = HuffmanTable::from_code_lengths(&lengths[hlit..])?;
        self.inflate_huffman(reader, &litlen, &distance)
    }

    fn inflate_huffman(
        &mut self,
        reader: &mut BitReader<'_>,
        litlen: &HuffmanTable,
        distance: &HuffmanTable,
    ) -> Result<()> {
        loop {
            let symbol = litlen.decode(reader)?;
            if symbol < 256 {
                self.check_limit(1, reader)?;
                self.output.push(symbol as u8);
                continue;
            }
            if symbol == END_OF_BLOCK {
                return Ok(());
            }

            let index = (symbol - 257) as usize;
            if index >= LENGTH_BASE.len() {
                return Err(OxiSealError::corrupted(
                    reader.bit_position() / 8,
                    format!("Invalid literal/length symbol: {}", symbol),
                ));
            }
            let length =
                LENGTH_BASE[index] as usize + reader.read_bits(LENGTH_EXTRA_BITS[index])? as usize;

            let dist_symbol = distance.decode(reader)? as usize;
            if dist_symbol >= DISTANCE_BASE.len() {
                return Err(OxiSealError::corrupted(
                    reader.bit_position() / 8,
                    format!("Invalid distance symbol: {}", dist_symbol),
                ));
            }
            let dist = DISTANCE_BASE[dist_symbol] as usize
                + reader.read_bits(DISTANCE_EXTRA_BITS[dist_symbol])? as usize;

            if dist > self.output.len() {
                return Err(OxiSealError::corrupted(
                    reader.bit_position() / 8,
                    format!(
                        "distance {} reaches before start of output ({})",
                        dist,
                        self.output.len()
                    ),
                ));
            }
            self.check_limit(length, reader)?;

            let start = self.output.len() - dist;
            if dist >= length {
                self.output.extend_from_within(start..start + length);
            } else {
                for i in 0..length {
                    let byte = self.output[start + i];
                    self.output.push(byte);
                }
            }
        }
    }
}

/// Decompress DEFLATE data.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    Inflater::new().inflate(data)
}

/// Decompress DEFLATE data whose uncompressed size is known in advance.
///
/// Fails if the stream produces more than `expected` bytes.
pub fn inflate_sized(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    Inflater::with_limit(expected).inflate(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_stored() {
        let compressed = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(inflate(&compressed).unwrap(), b"Hello");
    }

    #[test]
    fn test_inflate_empty_stored() {
        let compressed = [0x01, 0x00, 0x00, 0xFF, 0xFF];
        assert!(inflate(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_inflate_fixed() {
        assert_eq!(inflate(&[0x4B, 0x04, 0x00]).unwrap(), b"a");
        assert_eq!(
            inflate(&[0xCB, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00]).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_inflate_dynamic() {
        let compressed = [
            0xcd, 0xcb, 0xc7, 0x01, 0x80, 0x20, 0x10, 0x05, 0xd1, 0x56, 0x7e, 0x05, 0xd4, 0xe2,
            0xc1, 0x06, 0x40, 0x49, 0x06, 0x56, 0xb2, 0x50, 0xbd, 0x5b, 0x86, 0xe7, 0x79, 0xb3,
            0x3a, 0x8d, 0x58, 0xfd, 0x76, 0x42, 0x25, 0xea, 0x01, 0x86, 0x5e, 0x1c, 0xf5, 0x7e,
            0x32, 0xa8, 0xe9, 0x84, 0xc2, 0xf9, 0x92, 0x73, 0x60, 0x27, 0x2b, 0xb0, 0xfe, 0x03,
            0x2f, 0x92, 0xdd, 0x3d, 0xa0, 0x18, 0x75, 0x5f, 0x1c, 0x8c, 0x6f, 0x9a, 0xd3, 0xd4,
            0x01, 0x97, 0x8f, 0x95, 0x12, 0xbf, 0x36, 0x8b, 0x0f,
        ];
        let mut expected = b"The quick brown fox jumps over the lazy dog. ".repeat(4);
        expected.extend_from_slice(b"Pack my box with five dozen liquor jugs.");
        assert_eq!(inflate(&compressed).unwrap(), expected);
    }

    #[test]
    fn test_reserved_block_type() {
        assert!(inflate(&[0x07]).is_err());
    }

    #[test]
    fn test_size_limit() {
        let compressed = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert!(inflate_sized(&compressed, 4).is_err());
        assert_eq!(inflate_sized(&compressed, 5).unwrap(), b"Hello");
    }

    #[test]
    fn test_truncated_stream() {
        assert!(inflate(&[0xCB, 0x48, 0xCD]).is_err());
    }
}

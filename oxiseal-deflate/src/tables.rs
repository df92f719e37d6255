//! Static DEFLATE tables (RFC 1951 sections 3.2.5 and 3.2.6).

use crate::huffman::HuffmanTable;
use oxiseal_core::error::{OxiSealError, Result};
use std::sync::OnceLock;

/// End-of-block symbol in the literal/length alphabet.
pub const END_OF_BLOCK: u16 = 256;

/// Shortest back-reference.
pub const MIN_MATCH: usize = 3;

/// Longest back-reference.
pub const MAX_MATCH: usize = 258;

/// History window size.
pub const WINDOW_SIZE: usize = 32768;

/// Base length for length symbols 257..=285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for length symbols 257..=285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance symbols 0..=29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537, 2049,
    3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance symbols 0..=29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of code length code lengths in a dynamic header.
pub const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Code lengths of the fixed literal/length code.
pub fn fixed_litlen_lengths() -> [u8; 288] {
    std::array::from_fn(|symbol| match symbol {
        0..=143 => 8,
        144..=255 => 9,
        256..=279 => 7,
        _ => 8,
    })
}

/// Fixed literal/length decoding table, built once.
pub fn fixed_litlen_table() -> Result<&'static HuffmanTable> {
    static TABLE: OnceLock<Option<HuffmanTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| HuffmanTable::from_code_lengths(&fixed_litlen_lengths()).ok())
        .as_ref()
        .ok_or_else(|| OxiSealError::invalid_header("fixed literal/length code"))
}

/// Fixed distance decoding table, built once.
pub fn fixed_distance_table() -> Result<&'static HuffmanTable> {
    static TABLE: OnceLock<Option<HuffmanTable>> = OnceLock::new();
    TABLE
        .get_or_init(|| HuffmanTable::from_code_lengths(&[5u8; 30]).ok())
        .as_ref()
        .ok_or_else(|| OxiSealError::invalid_header("fixed distance code"))
}

/// Fixed literal/length code for `symbol` as (code, bit length), MSB-first.
pub fn fixed_litlen_code(symbol: u16) -> (u16, u8) {
    match symbol {
        0..=143 => (0x30 + symbol, 8),
        144..=255 => (0x190 + (symbol - 144), 9),
        256..=279 => (symbol - 256, 7),
        _ => (0xC0 + (symbol - 280), 8),
    }
}

/// Map a match length (3..=258) to (symbol, extra bit count, extra value).
pub fn length_symbol(length: u16) -> (u16, u8, u16) {
    debug_assert!((3..=258).contains(&length));
    // 258 has its own symbol even though 227 + 31 would reach it.
    let index = if length == 258 {
        28
    } else {
        LENGTH_BASE[..28].partition_point(|&base| base <= length) - 1
    };
    (
        257 + index as u16,
        LENGTH_EXTRA_BITS[index],
        length - LENGTH_BASE[index],
    )
}

/// Map a match distance (1..=32768) to (symbol, extra bit count, extra value).
pub fn distance_symbol(distance: u16) -> (u16, u8, u16) {
    debug_assert!(distance >= 1);
    let index = DISTANCE_BASE.partition_point(|&base| base <= distance) - 1;
    (
        index as u16,
        DISTANCE_EXTRA_BITS[index],
        distance - DISTANCE_BASE[index],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_litlen_lengths() {
        let lengths = fixed_litlen_lengths();
        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[255], 9);
        assert_eq!(lengths[256], 7);
        assert_eq!(lengths[279], 7);
        assert_eq!(lengths[280], 8);
        assert_eq!(lengths[287], 8);
    }

    #[test]
    fn test_fixed_tables_build() {
        assert!(fixed_litlen_table().is_ok());
        assert!(fixed_distance_table().is_ok());
    }

    #[test]
    fn test_fixed_codes_are_canonical() {
        assert_eq!(fixed_litlen_code(0), (0x30, 8));
        assert_eq!(fixed_litlen_code(144), (0x190, 9));
        assert_eq!(fixed_litlen_code(256), (0, 7));
        assert_eq!(fixed_litlen_code(287), (0xC7, 8));
    }

    #[test]
    fn test_length_symbols() {
        assert_eq!(length_symbol(3), (257, 0, 0));
        assert_eq!(length_symbol(10), (264, 0, 0));
        assert_eq!(length_symbol(11), (265, 1, 0));
        assert_eq!(length_symbol(12), (265, 1, 1));
        assert_eq!(length_symbol(257), (284, 5, 30));
        assert_eq!(length_symbol(258), (285, 0, 0));
        for length in 3..=258u16 {
            let (symbol, bits, extra) = length_symbol(length);
            assert!(extra < (1 << bits));
            assert_eq!(LENGTH_BASE[(symbol - 257) as usize] + extra, length);
        }
    }

    #[test]
    fn test_distance_symbols() {
        assert_eq!(distance_symbol(1), (0, 0, 0));
        assert_eq!(distance_symbol(5), (4, 1, 0));
        assert_eq!(distance_symbol(6), (4, 1, 1));
        assert_eq!(distance_symbol(32768), (29, 13, 8191));
        for distance in 1..=32768u16 {
            let (symbol, _, extra) = distance_symbol(distance);
            assert_eq!(DISTANCE_BASE[symbol as usize] + extra, distance);
        }
    }
}

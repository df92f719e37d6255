//! LZ77 match finding with hash chains.
//!
//! Positions are absolute offsets into the input slice; the finder keeps
//! its chains across calls so a later segment can reference an earlier one
//! as long as the distance stays within the 32 KiB window.

use crate::tables::{MAX_MATCH, MIN_MATCH, WINDOW_SIZE};

const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// One LZ77 output symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A byte emitted as-is.
    Literal(u8),
    /// Copy `length` bytes starting `distance` bytes back.
    Match {
        /// Match length (3..=258).
        length: u16,
        /// Distance back into the history (1..=32768).
        distance: u16,
    },
}

/// Hash-chain match finder.
#[derive(Debug)]
pub struct MatchFinder {
    /// Most recent position + 1 for each hash, 0 = empty.
    head: Vec<u32>,
    /// Previous position + 1 with the same hash, indexed by position & mask.
    prev: Vec<u32>,
    max_chain: usize,
    nice_length: usize,
}

impl MatchFinder {
    /// Create a finder tuned for a compression level (1..=9).
    pub fn new(level: u8) -> Self {
        let (max_chain, nice_length) = match level {
            0 | 1 => (4, 16),
            2 => (8, 32),
            3 => (16, 32),
            4 => (32, 64),
            5 => (64, 128),
            6 => (128, 128),
            7 => (256, 258),
            8 => (1024, 258),
            _ => (4096, 258),
        };
        Self {
            head: vec![0; HASH_SIZE],
            prev: vec![0; WINDOW_SIZE],
            max_chain,
            nice_length,
        }
    }

    #[inline]
    fn hash(data: &[u8], pos: usize) -> usize {
        let v = (data[pos] as u32) << 16 | (data[pos + 1] as u32) << 8 | data[pos + 2] as u32;
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    #[inline]
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let h = Self::hash(data, pos);
        self.prev[pos & WINDOW_MASK] = self.head[h];
        self.head[h] = pos as u32 + 1;
    }

    fn longest_match(&self, data: &[u8], pos: usize, end: usize) -> Option<(usize, usize)> {
        let max_len = MAX_MATCH.min(end - pos);
        if max_len < MIN_MATCH {
            return None;
        }
        let mut candidate = self.head[Self::hash(data, pos)] as usize;
        let mut best_len = MIN_MATCH - 1;
        let mut best_dist = 0;
        let mut chain = self.max_chain;

        while candidate != 0 && chain > 0 {
            let p = candidate - 1;
            if p >= pos || pos - p > WINDOW_SIZE {
                break;
            }
            // Cheap reject on the byte that would extend the best match.
            if data[p + best_len] == data[pos + best_len] {
                let len = data[p..p + max_len]
                    .iter()
                    .zip(&data[pos..pos + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();
                if len > best_len {
                    best_len = len;
                    best_dist = pos - p;
                    if len >= self.nice_length || len == max_len {
                        break;
                    }
                }
            }
            let next = self.prev[p & WINDOW_MASK] as usize;
            if next >= candidate {
                break;
            }
            candidate = next;
            chain -= 1;
        }

        (best_len >= MIN_MATCH).then_some((best_len, best_dist))
    }

    /// Tokenize `data[start..end]`, appending to `out`.
    ///
    /// Earlier bytes of `data` serve as history; matches never run past `end`.
    pub fn tokenize(&mut self, data: &[u8], start: usize, end: usize, out: &mut Vec<Lz77Token>) {
        let mut pos = start;
        while pos < end {
            match self.longest_match(data, pos, end) {
                Some((length, distance)) => {
                    out.push(Lz77Token::Match {
                        length: length as u16,
                        distance: distance as u16,
                    });
                    for p in pos..pos + length {
                        self.insert(data, p);
                    }
                    pos += length;
                }
                None => {
                    out.push(Lz77Token::Literal(data[pos]));
                    self.insert(data, pos);
                    pos += 1;
                }
            }
        }
    }
}

/// Expand tokens back into bytes.
pub fn expand(tokens: &[Lz77Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        match *token {
            Lz77Token::Literal(b) => out.push(b),
            Lz77Token::Match { length, distance } => {
                let start = out.len() - distance as usize;
                for i in 0..length as usize {
                    let b = out[start + i];
                    out.push(b);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_repeats() {
        let data = b"abcabcabcabcabcabc";
        let mut finder = MatchFinder::new(6);
        let mut tokens = Vec::new();
        finder.tokenize(data, 0, data.len(), &mut tokens);
        assert!(tokens.iter().any(|t| matches!(t, Lz77Token::Match { .. })));
        assert_eq!(expand(&tokens), data);
    }

    #[test]
    fn test_overlapping_run() {
        let data = vec![7u8; 600];
        let mut finder = MatchFinder::new(9);
        let mut tokens = Vec::new();
        finder.tokenize(&data, 0, data.len(), &mut tokens);
        assert!(tokens.len() < 10);
        assert_eq!(expand(&tokens), data);
    }

    #[test]
    fn test_segments_share_history() {
        let mut data = b"0123456789abcdef".repeat(4);
        data.extend_from_slice(b"0123456789abcdef");
        let split = 64;
        let mut finder = MatchFinder::new(6);
        let mut tokens = Vec::new();
        finder.tokenize(&data, 0, split, &mut tokens);
        let first = tokens.len();
        finder.tokenize(&data, split, data.len(), &mut tokens);
        assert!(matches!(tokens[first], Lz77Token::Match { distance: 16, .. }));
        assert_eq!(expand(&tokens), data);
    }

    #[test]
    fn test_short_input_is_literal() {
        let mut finder = MatchFinder::new(6);
        let mut tokens = Vec::new();
        finder.tokenize(b"ab", 0, 2, &mut tokens);
        assert_eq!(tokens, vec![Lz77Token::Literal(b'a'), Lz77Token::Literal(b'b')]);
    }
}

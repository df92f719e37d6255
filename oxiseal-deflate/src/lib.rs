//! # OxiSeal Deflate
//!
//! Pure Rust DEFLATE codec (RFC 1951) used for PKZIP entry payloads.
//!
//! - **Decompression**: stored, fixed Huffman and dynamic Huffman blocks
//! - **Compression**: hash-chain LZ77 with fixed Huffman codes, falling back
//!   to stored blocks per segment when that is smaller
//!
//! ## Example
//!
//! ```rust
//! use oxiseal_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: No compression (stored blocks)
//! - Level 1-3: Short hash chains
//! - Level 4-6: Balanced (default is 6)
//! - Level 7-9: Long hash chains

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod tables;

// Re-exports
pub use deflate::{DEFAULT_LEVEL, Deflater, deflate};
pub use huffman::HuffmanTable;
pub use inflate::{Inflater, inflate, inflate_sized};
pub use lz77::{Lz77Token, MatchFinder};

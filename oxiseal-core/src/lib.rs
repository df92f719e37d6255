//! # OxiSeal Core
//!
//! Core components shared by every OxiSeal layer:
//!
//! - [`bitstream`]: Bit-level I/O for DEFLATE
//! - [`crc`]: CRC-32 and a checksumming writer
//! - [`entry`]: Container entry metadata
//! - [`error`]: Error types and the failure taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: Engine                                              │
//! │     classify, key, cipher, index, transcode, decrypt    │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     PKZIP central directory reader, streaming writer    │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Deflate (LZ77+Huffman)                              │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     BitReader/BitWriter, CRC, entries, errors           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxiseal_core::bitstream::BitReader;
//! use oxiseal_core::crc::Crc32;
//!
//! let data = [0xAB, 0xCD];
//! let mut reader = BitReader::new(&data);
//! let bits = reader.read_bits(12).unwrap();
//! assert_eq!(bits, 0xDAB);
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod crc;
pub mod entry;
pub mod error;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use crc::{Crc32, CrcWriter};
pub use entry::{CompressionMethod, ContainerEntry, DosDateTime, EntryKind};
pub use error::{ErrorKind, OxiSealError, Result};

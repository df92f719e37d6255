//! # OxiSeal Archive
//!
//! PKZIP container support for OxiSeal.
//!
//! JAR and WAR files are plain PKZIP containers, so this crate only knows
//! about PKZIP: reading through the central directory (with Zip64) and
//! streaming entries out with either known sizes or a trailing data
//! descriptor.
//!
//! ## Example
//!
//! ```rust
//! use oxiseal_archive::zip::{ZipReader, ZipWriter};
//! use oxiseal_core::{CompressionMethod, DosDateTime};
//! use std::io::Cursor;
//!
//! let mut writer = ZipWriter::new(Vec::new());
//! writer
//!     .add_entry("hello.txt", DosDateTime::now(), CompressionMethod::Deflate, b"Hello")
//!     .unwrap();
//! let bytes = writer.into_inner().unwrap();
//!
//! let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
//! let entry = reader.entries()[0].clone();
//! assert_eq!(reader.extract(&entry).unwrap(), b"Hello");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod zip;

pub use zip::{EntryOptions, EntryWriter, KnownPayload, ZipReader, ZipWriter};

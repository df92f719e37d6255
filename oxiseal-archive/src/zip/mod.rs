//! PKZIP container format support.
//!
//! This module provides reading and writing of PKZIP containers as
//! specified in the PKWARE APPNOTE.

pub mod header;
mod reader;
mod writer;

pub use reader::ZipReader;
pub use writer::{EntryOptions, EntryWriter, KnownPayload, ZipWriter};

use oxiseal_core::error::Result;
use std::io::{Read, Seek, Write};

/// Open a PKZIP container.
pub fn read_zip<R: Read + Seek>(reader: R) -> Result<ZipReader<R>> {
    ZipReader::new(reader)
}

/// Create a new PKZIP container writer.
pub fn write_zip<W: Write>(writer: W) -> ZipWriter<W> {
    ZipWriter::new(writer)
}

//! PKZIP writing.
//!
//! Entries are appended one at a time. [`ZipWriter::start_entry`] hands out
//! an [`EntryWriter`] that borrows the container mutably, so at most one
//! entry is open at any moment. The central directory is written by
//! [`ZipWriter::finish`].

use super::header::{CentralDirLocation, CentralDirRecord, FLAG_DATA_DESCRIPTOR, FLAG_UTF8};
use oxiseal_core::crc::Crc32;
use oxiseal_core::entry::{CompressionMethod, DosDateTime};
use oxiseal_core::error::{OxiSealError, Result};
use oxiseal_deflate::Deflater;
use std::io::{self, Write};

/// Byte-counting wrapper; its count is the offset of the next record.
#[derive(Debug)]
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// CRC and size of a payload known before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPayload {
    /// CRC-32 of the payload.
    pub crc32: u32,
    /// Payload size in bytes.
    pub size: u64,
}

/// How a new entry is to be written.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Entry name.
    pub name: String,
    /// Modification time.
    pub modified: DosDateTime,
    /// Compression method (`Stored` or `Deflate`).
    pub method: CompressionMethod,
    /// Checksum and size, when known up front.
    pub known: Option<KnownPayload>,
}

impl EntryOptions {
    /// A DEFLATE entry whose sizes follow in a data descriptor.
    pub fn deflated(name: impl Into<String>, modified: DosDateTime) -> Self {
        Self {
            name: name.into(),
            modified,
            method: CompressionMethod::Deflate,
            known: None,
        }
    }

    /// A STORED entry streamed straight through; the written bytes must
    /// match `crc32` and `size`.
    pub fn stored(name: impl Into<String>, modified: DosDateTime, crc32: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            modified,
            method: CompressionMethod::Stored,
            known: Some(KnownPayload { crc32, size }),
        }
    }

    /// A STORED entry staged in memory until its checksum is known.
    pub fn staged(name: impl Into<String>, modified: DosDateTime) -> Self {
        Self {
            name: name.into(),
            modified,
            method: CompressionMethod::Stored,
            known: None,
        }
    }
}

/// PKZIP container writer.
#[derive(Debug)]
pub struct ZipWriter<W: Write> {
    writer: CountingWriter<W>,
    records: Vec<CentralDirRecord>,
    deflater: Deflater,
    finished: bool,
}

impl<W: Write> ZipWriter<W> {
    /// Create a writer with the default compression level (6).
    pub fn new(writer: W) -> Self {
        Self {
            writer: CountingWriter {
                inner: writer,
                count: 0,
            },
            records: Vec::new(),
            deflater: Deflater::default(),
            finished: false,
        }
    }

    /// Create a writer that deflates at `level` (0..=9).
    pub fn with_level(writer: W, level: u8) -> Result<Self> {
        let mut zip = Self::new(writer);
        zip.deflater = Deflater::new(level)?;
        Ok(zip)
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    fn check_open(&self, name: &str) -> Result<()> {
        if self.finished {
            return Err(OxiSealError::invalid_parameter(format!(
                "{}: container already finished",
                name
            )));
        }
        if name.is_empty() {
            return Err(OxiSealError::invalid_parameter("empty entry name"));
        }
        if name.len() > u16::MAX as usize {
            return Err(OxiSealError::invalid_parameter(format!(
                "entry name of {} bytes is too long",
                name.len()
            )));
        }
        Ok(())
    }

    fn new_record(
        &self,
        name: String,
        method: CompressionMethod,
        modified: DosDateTime,
    ) -> CentralDirRecord {
        CentralDirRecord {
            name,
            flags: FLAG_UTF8,
            method,
            modified,
            crc32: 0,
            compressed_size: 0,
            size: 0,
            header_offset: self.writer.count,
        }
    }

    /// Add a directory entry; a trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str, modified: DosDateTime) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        self.check_open(&name)?;
        let record = self.new_record(name, CompressionMethod::Stored, modified);
        record.write_local(&mut self.writer)?;
        self.records.push(record);
        Ok(())
    }

    /// Add a complete in-memory payload with sizes in the local header.
    pub fn add_entry(
        &mut self,
        name: &str,
        modified: DosDateTime,
        method: CompressionMethod,
        data: &[u8],
    ) -> Result<()> {
        self.check_open(name)?;
        let mut record = self.new_record(name.to_string(), method, modified);
        record.crc32 = Crc32::compute(data);
        record.size = data.len() as u64;
        match method {
            CompressionMethod::Stored => {
                record.compressed_size = record.size;
                record.write_local(&mut self.writer)?;
                self.writer.write_all(data)?;
            }
            CompressionMethod::Deflate => {
                let compressed = self.deflater.compress(data);
                record.compressed_size = compressed.len() as u64;
                record.write_local(&mut self.writer)?;
                self.writer.write_all(&compressed)?;
            }
            CompressionMethod::Unknown(id) => {
                return Err(OxiSealError::unsupported_method(format!("{}: method {}", name, id)));
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// Open a new entry for streaming.
    ///
    /// The returned writer must be finished with [`EntryWriter::finish`];
    /// dropping it finalizes the entry on a best-effort basis.
    pub fn start_entry(&mut self, options: EntryOptions) -> Result<EntryWriter<'_, W>> {
        self.check_open(&options.name)?;
        let mut record = self.new_record(options.name, options.method, options.modified);
        let mode = match (options.method, options.known) {
            (CompressionMethod::Stored, Some(known)) => {
                record.crc32 = known.crc32;
                record.size = known.size;
                record.compressed_size = known.size;
                record.write_local(&mut self.writer)?;
                Mode::Streamed
            }
            (CompressionMethod::Stored, None) => Mode::Staged,
            (CompressionMethod::Deflate, _) => {
                record.flags |= FLAG_DATA_DESCRIPTOR;
                record.write_local(&mut self.writer)?;
                Mode::Deflated
            }
            (CompressionMethod::Unknown(id), _) => {
                return Err(OxiSealError::unsupported_method(format!(
                    "{}: method {}",
                    record.name, id
                )));
            }
        };
        Ok(EntryWriter {
            zip: self,
            record,
            mode,
            crc: Crc32::new(),
            written: 0,
            buffer: Vec::new(),
            closed: false,
        })
    }

    /// Write the central directory and end records, then flush.
    ///
    /// Calling this more than once is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let offset = self.writer.count;
        for record in &self.records {
            record.write_central(&mut self.writer)?;
        }
        let location = CentralDirLocation {
            entries: self.records.len() as u64,
            size: self.writer.count - offset,
            offset,
        };
        location.write_trailer(&mut self.writer, false)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Finish the container and return the destination.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.writer.inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// STORED, header already carries CRC and size.
    Streamed,
    /// DEFLATE, header written, descriptor follows the payload.
    Deflated,
    /// STORED, header written once the payload is complete.
    Staged,
}

/// A single open entry.
///
/// Only [`EntryOptions::stored`] entries go straight to the container.
/// Deflated and staged entries hold their whole payload in memory until
/// [`EntryWriter::finish`], so memory use grows with the largest such entry.
#[derive(Debug)]
pub struct EntryWriter<'a, W: Write> {
    zip: &'a mut ZipWriter<W>,
    record: CentralDirRecord,
    mode: Mode,
    crc: Crc32,
    written: u64,
    buffer: Vec<u8>,
    closed: bool,
}

impl<W: Write> EntryWriter<'_, W> {
    /// Entry name.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Complete the entry.
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.mode {
            Mode::Streamed => {
                if self.written != self.record.size {
                    return Err(OxiSealError::corrupted(
                        self.record.header_offset,
                        format!(
                            "{}: wrote {} bytes, header says {}",
                            self.record.name, self.written, self.record.size
                        ),
                    ));
                }
                let computed = self.crc.value();
                if computed != self.record.crc32 {
                    return Err(OxiSealError::crc_mismatch(self.record.crc32, computed));
                }
            }
            Mode::Deflated => {
                let data = std::mem::take(&mut self.buffer);
                let compressed = self.zip.deflater.compress(&data);
                self.record.crc32 = Crc32::compute(&data);
                self.record.size = data.len() as u64;
                self.record.compressed_size = compressed.len() as u64;
                self.zip.writer.write_all(&compressed)?;
                self.record.write_descriptor(&mut self.zip.writer)?;
            }
            Mode::Staged => {
                let data = std::mem::take(&mut self.buffer);
                self.record.crc32 = Crc32::compute(&data);
                self.record.size = data.len() as u64;
                self.record.compressed_size = self.record.size;
                self.record.write_local(&mut self.zip.writer)?;
                self.zip.writer.write_all(&data)?;
            }
        }
        self.zip.records.push(self.record.clone());
        Ok(())
    }
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other("entry already finished"));
        }
        match self.mode {
            Mode::Streamed => {
                if self.written + buf.len() as u64 > self.record.size {
                    return Err(OxiSealError::corrupted(
                        self.record.header_offset,
                        format!(
                            "{}: payload exceeds declared size {}",
                            self.record.name, self.record.size
                        ),
                    )
                    .into());
                }
                self.zip.writer.write_all(buf)?;
                self.crc.update(buf);
                self.written += buf.len() as u64;
            }
            Mode::Deflated | Mode::Staged => self.buffer.extend_from_slice(buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.writer.flush()
    }
}

impl<W: Write> Drop for EntryWriter<'_, W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

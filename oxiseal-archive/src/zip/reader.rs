//! PKZIP reading through the central directory.

use super::header::{
    CentralDirLocation, CentralDirRecord, EOCD_LEN, END_OF_CENTRAL_DIR_SIG, FLAG_ENCRYPTED,
    LOCAL_FILE_HEADER_SIG, LOCAL_HEADER_LEN, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG, u16_at, u32_at,
    u64_at,
};
use oxiseal_core::crc::{Crc32, CrcWriter};
use oxiseal_core::entry::{CompressionMethod, ContainerEntry};
use oxiseal_core::error::{OxiSealError, Result};
use oxiseal_deflate::inflate_sized;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Largest trailing comment an EOCD search has to skip.
const MAX_COMMENT_LEN: u64 = 65_535;

/// PKZIP container reader.
///
/// Entries come from the central directory, in its order. A zero-length
/// source is an empty container.
#[derive(Debug)]
pub struct ZipReader<R> {
    reader: R,
    entries: Vec<ContainerEntry>,
}

impl<R: Read + Seek> ZipReader<R> {
    /// Open a container and read its central directory.
    pub fn new(mut reader: R) -> Result<Self> {
        let entries = read_central_directory(&mut reader)?;
        Ok(Self { reader, entries })
    }

    /// All entries, in central directory order.
    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by exact name.
    pub fn entry_by_name(&self, name: &str) -> Option<&ContainerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read the payload exactly as stored, without decompressing.
    pub fn read_raw(&mut self, entry: &ContainerEntry) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(entry.data_offset))?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.reader.read_exact(&mut raw)?;
        Ok(raw)
    }

    /// Extract and verify an entry's payload.
    pub fn extract(&mut self, entry: &ContainerEntry) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(entry.size.min(16 << 20) as usize);
        self.extract_to(entry, &mut out)?;
        Ok(out)
    }

    /// Extract an entry's payload into `out`; returns the bytes written.
    ///
    /// Stored payloads are streamed straight through; deflated payloads are
    /// inflated in memory first. The CRC is checked in both cases, so for a
    /// stored entry a mismatch surfaces only after the bytes were written.
    pub fn extract_to<W: Write>(&mut self, entry: &ContainerEntry, out: &mut W) -> Result<u64> {
        if entry.is_encrypted() {
            return Err(OxiSealError::unsupported_method(format!(
                "{}: traditional PKZIP encryption",
                entry.name
            )));
        }
        match entry.method {
            CompressionMethod::Stored => {
                if entry.size != entry.compressed_size {
                    return Err(OxiSealError::corrupted(
                        entry.data_offset,
                        format!(
                            "{}: stored entry sizes differ ({} vs {})",
                            entry.name, entry.size, entry.compressed_size
                        ),
                    ));
                }
                self.reader.seek(SeekFrom::Start(entry.data_offset))?;
                let mut sink = CrcWriter::new(out);
                let copied = io::copy(&mut (&mut self.reader).take(entry.size), &mut sink)?;
                if copied != entry.size {
                    return Err(OxiSealError::unexpected_eof((entry.size - copied) as usize));
                }
                verify_crc(entry.crc32, sink.crc())?;
                Ok(copied)
            }
            CompressionMethod::Deflate => {
                let raw = self.read_raw(entry)?;
                let data = inflate_sized(&raw, entry.size as usize)?;
                if data.len() as u64 != entry.size {
                    return Err(OxiSealError::corrupted(
                        entry.data_offset,
                        format!(
                            "{}: inflated {} bytes, header says {}",
                            entry.name,
                            data.len(),
                            entry.size
                        ),
                    ));
                }
                verify_crc(entry.crc32, Crc32::compute(&data))?;
                out.write_all(&data)?;
                Ok(data.len() as u64)
            }
            CompressionMethod::Unknown(id) => Err(OxiSealError::unsupported_method(format!(
                "{}: method {}",
                entry.name, id
            ))),
        }
    }

    /// Get the underlying source back.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn verify_crc(expected: u32, computed: u32) -> Result<()> {
    if expected != computed {
        return Err(OxiSealError::crc_mismatch(expected, computed));
    }
    Ok(())
}

fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<ContainerEntry>> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    if file_size == 0 {
        return Ok(Vec::new());
    }
    if file_size < EOCD_LEN as u64 {
        return Err(OxiSealError::invalid_header(
            "not a PKZIP container: too short for an end of central directory record",
        ));
    }

    // Search backwards for the EOCD, which may be followed by a comment.
    let tail_len = file_size.min(MAX_COMMENT_LEN + EOCD_LEN as u64);
    let tail_start = file_size - tail_len;
    reader.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; tail_len as usize];
    reader.read_exact(&mut tail)?;

    let eocd_rel = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&i| u32_at(&tail, i) == END_OF_CENTRAL_DIR_SIG)
        .ok_or_else(|| {
            OxiSealError::invalid_header("not a PKZIP container: end of central directory not found")
        })?;
    let eocd_pos = tail_start + eocd_rel as u64;
    let mut location = CentralDirLocation::parse_eocd(&tail[eocd_rel..])?;

    if eocd_pos >= 20 {
        reader.seek(SeekFrom::Start(eocd_pos - 20))?;
        let mut locator = [0u8; 20];
        reader.read_exact(&mut locator)?;
        if u32_at(&locator, 0) == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
            let zip64_offset = u64_at(&locator, 8);
            if zip64_offset.saturating_add(56) > eocd_pos {
                return Err(OxiSealError::invalid_header("Zip64 EOCD offset out of range"));
            }
            reader.seek(SeekFrom::Start(zip64_offset))?;
            let mut record = [0u8; 56];
            reader.read_exact(&mut record)?;
            location = CentralDirLocation::parse_zip64_eocd(&record)?;
        }
    }

    if location
        .offset
        .checked_add(location.size)
        .is_none_or(|end| end > eocd_pos)
    {
        return Err(OxiSealError::invalid_header(format!(
            "central directory ({} bytes at {}) overruns the container",
            location.size, location.offset
        )));
    }

    reader.seek(SeekFrom::Start(location.offset))?;
    let mut directory = vec![0u8; location.size as usize];
    reader.read_exact(&mut directory)?;

    let mut records = Vec::with_capacity(location.entries.min(65_536) as usize);
    let mut pos = 0;
    for _ in 0..location.entries {
        let (record, consumed) = CentralDirRecord::parse(&directory[pos..])?;
        records.push(record);
        pos += consumed;
    }

    let mut entries = Vec::with_capacity(records.len());
    for record in &records {
        if record.header_offset.saturating_add(LOCAL_HEADER_LEN) > location.offset {
            return Err(OxiSealError::invalid_header(format!(
                "{}: local header offset {} out of range",
                record.name, record.header_offset
            )));
        }
        let data_offset = local_data_offset(reader, record)?;
        if record.flags & FLAG_ENCRYPTED == 0
            && data_offset.saturating_add(record.compressed_size) > location.offset
        {
            return Err(OxiSealError::invalid_header(format!(
                "{}: payload overruns the central directory",
                record.name
            )));
        }
        entries.push(record.to_entry(data_offset));
    }
    Ok(entries)
}

/// Payload offset from the entry's local header, whose extra field may
/// differ from the central one.
fn local_data_offset<R: Read + Seek>(reader: &mut R, record: &CentralDirRecord) -> Result<u64> {
    reader.seek(SeekFrom::Start(record.header_offset))?;
    let mut local = [0u8; LOCAL_HEADER_LEN as usize];
    reader.read_exact(&mut local)?;
    let signature = u32_at(&local, 0);
    if signature != LOCAL_FILE_HEADER_SIG {
        return Err(OxiSealError::invalid_magic(LOCAL_FILE_HEADER_SIG, signature));
    }
    let name_len = u16_at(&local, 26) as u64;
    let extra_len = u16_at(&local, 28) as u64;
    Ok(record.header_offset + LOCAL_HEADER_LEN + name_len + extra_len)
}

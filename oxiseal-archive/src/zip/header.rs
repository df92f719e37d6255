//! PKZIP record layouts.
//!
//! Field order and sizes follow the PKWARE APPNOTE. All integers are
//! little-endian.

use oxiseal_core::entry::{CompressionMethod, ContainerEntry, DosDateTime, EntryKind};
use oxiseal_core::error::{OxiSealError, Result};
use std::io::Write;

/// Local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// Central directory file header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// End of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// Zip64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// Zip64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature.
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// Zip64 extended information extra field id.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// 32-bit field value meaning "see Zip64 extra field".
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// 16-bit field value meaning "see Zip64 end of central directory".
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Fixed size of a local file header.
pub const LOCAL_HEADER_LEN: u64 = 30;

/// Fixed size of a central directory header.
pub const CENTRAL_HEADER_LEN: usize = 46;

/// Fixed size of the end of central directory record.
pub const EOCD_LEN: usize = 22;

/// General purpose flag: payload encrypted (traditional PKWARE).
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: sizes and CRC follow the payload.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

const VERSION_MADE_BY: u16 = 0x0314; // Unix, 2.0
const VERSION_DEFLATE: u16 = 20;
const VERSION_ZIP64: u16 = 45;

pub(crate) fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub(crate) fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn clamp32(value: u64) -> u32 {
    if value >= ZIP64_MARKER_32 as u64 {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

/// Everything the central directory records about one entry.
#[derive(Debug, Clone)]
pub struct CentralDirRecord {
    /// Entry name as written.
    pub name: String,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Modification time.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed payload.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub size: u64,
    /// Offset of the local header.
    pub header_offset: u64,
}

impl CentralDirRecord {
    fn needs_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_MARKER_32 as u64
            || self.size >= ZIP64_MARKER_32 as u64
            || self.header_offset >= ZIP64_MARKER_32 as u64
    }

    fn version_needed(&self) -> u16 {
        if self.needs_zip64() {
            VERSION_ZIP64
        } else {
            VERSION_DEFLATE
        }
    }

    fn zip64_extra(&self, include_offset: bool) -> Vec<u8> {
        let mut fields = Vec::with_capacity(24);
        if self.size >= ZIP64_MARKER_32 as u64 {
            fields.extend_from_slice(&self.size.to_le_bytes());
        }
        if self.compressed_size >= ZIP64_MARKER_32 as u64 {
            fields.extend_from_slice(&self.compressed_size.to_le_bytes());
        }
        if include_offset && self.header_offset >= ZIP64_MARKER_32 as u64 {
            fields.extend_from_slice(&self.header_offset.to_le_bytes());
        }
        if fields.is_empty() {
            return fields;
        }
        let mut extra = Vec::with_capacity(4 + fields.len());
        extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        extra.extend_from_slice(&(fields.len() as u16).to_le_bytes());
        extra.extend_from_slice(&fields);
        extra
    }

    /// Write the local file header; returns its length.
    ///
    /// With [`FLAG_DATA_DESCRIPTOR`] set, CRC and sizes are written as zero.
    pub fn write_local<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let deferred = self.flags & FLAG_DATA_DESCRIPTOR != 0;
        let extra = if deferred {
            Vec::new()
        } else {
            // Local Zip64 extra must carry both sizes.
            if self.needs_zip64() {
                let mut extra = Vec::with_capacity(20);
                extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
                extra.extend_from_slice(&16u16.to_le_bytes());
                extra.extend_from_slice(&self.size.to_le_bytes());
                extra.extend_from_slice(&self.compressed_size.to_le_bytes());
                extra
            } else {
                Vec::new()
            }
        };
        let (crc, compressed, size) = match (deferred, extra.is_empty()) {
            (true, _) => (0, 0, 0),
            (false, true) => (
                self.crc32,
                self.compressed_size as u32,
                self.size as u32,
            ),
            (false, false) => (self.crc32, ZIP64_MARKER_32, ZIP64_MARKER_32),
        };
        let name = self.name.as_bytes();

        let mut header = Vec::with_capacity(LOCAL_HEADER_LEN as usize + name.len() + extra.len());
        header.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        header.extend_from_slice(&self.version_needed().to_le_bytes());
        header.extend_from_slice(&self.flags.to_le_bytes());
        header.extend_from_slice(&self.method.zip_id().to_le_bytes());
        header.extend_from_slice(&self.modified.time.to_le_bytes());
        header.extend_from_slice(&self.modified.date.to_le_bytes());
        header.extend_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&compressed.to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes());
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        header.extend_from_slice(name);
        header.extend_from_slice(&extra);
        writer.write_all(&header)?;
        Ok(header.len() as u64)
    }

    /// Write the data descriptor that follows a deferred payload.
    pub fn write_descriptor<W: Write>(&self, writer: &mut W) -> Result<u64> {
        if self.size >= ZIP64_MARKER_32 as u64 || self.compressed_size >= ZIP64_MARKER_32 as u64 {
            return Err(OxiSealError::invalid_header(format!(
                "{}: streamed entry exceeds 4 GiB",
                self.name
            )));
        }
        let mut descriptor = [0u8; 16];
        descriptor[0..4].copy_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        descriptor[4..8].copy_from_slice(&self.crc32.to_le_bytes());
        descriptor[8..12].copy_from_slice(&(self.compressed_size as u32).to_le_bytes());
        descriptor[12..16].copy_from_slice(&(self.size as u32).to_le_bytes());
        writer.write_all(&descriptor)?;
        Ok(descriptor.len() as u64)
    }

    /// Write the central directory header; returns its length.
    pub fn write_central<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let name = self.name.as_bytes();
        let extra = self.zip64_extra(true);
        let external_attr: u32 = if self.name.ends_with('/') {
            (0o40755 << 16) | 0x10
        } else {
            0o100644 << 16
        };

        let mut header = Vec::with_capacity(CENTRAL_HEADER_LEN + name.len() + extra.len());
        header.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        header.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
        header.extend_from_slice(&self.version_needed().to_le_bytes());
        header.extend_from_slice(&self.flags.to_le_bytes());
        header.extend_from_slice(&self.method.zip_id().to_le_bytes());
        header.extend_from_slice(&self.modified.time.to_le_bytes());
        header.extend_from_slice(&self.modified.date.to_le_bytes());
        header.extend_from_slice(&self.crc32.to_le_bytes());
        header.extend_from_slice(&clamp32(self.compressed_size).to_le_bytes());
        header.extend_from_slice(&clamp32(self.size).to_le_bytes());
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // comment length
        header.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        header.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        header.extend_from_slice(&external_attr.to_le_bytes());
        header.extend_from_slice(&clamp32(self.header_offset).to_le_bytes());
        header.extend_from_slice(name);
        header.extend_from_slice(&extra);
        writer.write_all(&header)?;
        Ok(header.len() as u64)
    }

    /// Parse one central directory header at the start of `buf`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < CENTRAL_HEADER_LEN {
            return Err(OxiSealError::invalid_header("truncated central directory"));
        }
        let signature = u32_at(buf, 0);
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(OxiSealError::invalid_magic(CENTRAL_DIR_HEADER_SIG, signature));
        }

        let flags = u16_at(buf, 8);
        let method = CompressionMethod::from_zip_id(u16_at(buf, 10));
        let modified = DosDateTime::new(u16_at(buf, 12), u16_at(buf, 14));
        let crc32 = u32_at(buf, 16);
        let compressed_32 = u32_at(buf, 20);
        let size_32 = u32_at(buf, 24);
        let name_len = u16_at(buf, 28) as usize;
        let extra_len = u16_at(buf, 30) as usize;
        let comment_len = u16_at(buf, 32) as usize;
        let offset_32 = u32_at(buf, 42);

        let total = CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
        if buf.len() < total {
            return Err(OxiSealError::invalid_header("truncated central directory"));
        }
        let name_bytes = &buf[CENTRAL_HEADER_LEN..CENTRAL_HEADER_LEN + name_len];
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        let extra = &buf[CENTRAL_HEADER_LEN + name_len..CENTRAL_HEADER_LEN + name_len + extra_len];

        let mut size = size_32 as u64;
        let mut compressed_size = compressed_32 as u64;
        let mut header_offset = offset_32 as u64;
        if let Some(fields) = find_extra(extra, ZIP64_EXTRA_FIELD_ID) {
            let mut cursor = 0;
            let mut next = |present: bool, slot: &mut u64| {
                if present && cursor + 8 <= fields.len() {
                    *slot = u64_at(fields, cursor);
                    cursor += 8;
                }
            };
            next(size_32 == ZIP64_MARKER_32, &mut size);
            next(compressed_32 == ZIP64_MARKER_32, &mut compressed_size);
            next(offset_32 == ZIP64_MARKER_32, &mut header_offset);
        }

        Ok((
            Self {
                name,
                flags,
                method,
                modified,
                crc32,
                compressed_size,
                size,
                header_offset,
            },
            total,
        ))
    }

    /// Convert to the format-neutral entry model.
    pub fn to_entry(&self, data_offset: u64) -> ContainerEntry {
        ContainerEntry {
            kind: EntryKind::from_path(&self.name),
            name: self.name.clone(),
            size: self.size,
            compressed_size: self.compressed_size,
            method: self.method,
            modified: self.modified,
            crc32: self.crc32,
            flags: self.flags,
            header_offset: self.header_offset,
            data_offset,
        }
    }
}

/// Locate the payload of extra field `id`.
fn find_extra(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let header_id = u16_at(extra, offset);
        let len = u16_at(extra, offset + 2) as usize;
        let start = offset + 4;
        if start + len > extra.len() {
            return None;
        }
        if header_id == id {
            return Some(&extra[start..start + len]);
        }
        offset = start + len;
    }
    None
}

/// Location of the central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirLocation {
    /// Number of entries.
    pub entries: u64,
    /// Size in bytes.
    pub size: u64,
    /// Offset of the first header.
    pub offset: u64,
}

impl CentralDirLocation {
    /// Parse a classic end of central directory record.
    pub fn parse_eocd(buf: &[u8]) -> Result<Self> {
        if buf.len() < EOCD_LEN {
            return Err(OxiSealError::invalid_header("EOCD too short"));
        }
        Ok(Self {
            entries: u16_at(buf, 10) as u64,
            size: u32_at(buf, 12) as u64,
            offset: u32_at(buf, 16) as u64,
        })
    }

    /// Parse a Zip64 end of central directory record.
    pub fn parse_zip64_eocd(buf: &[u8]) -> Result<Self> {
        if buf.len() < 56 {
            return Err(OxiSealError::invalid_header("Zip64 EOCD too short"));
        }
        let signature = u32_at(buf, 0);
        if signature != ZIP64_END_OF_CENTRAL_DIR_SIG {
            return Err(OxiSealError::invalid_magic(
                ZIP64_END_OF_CENTRAL_DIR_SIG,
                signature,
            ));
        }
        Ok(Self {
            entries: u64_at(buf, 32),
            size: u64_at(buf, 40),
            offset: u64_at(buf, 48),
        })
    }

    /// Whether the classic record cannot hold these values.
    pub fn needs_zip64(&self) -> bool {
        self.entries >= ZIP64_MARKER_16 as u64
            || self.size >= ZIP64_MARKER_32 as u64
            || self.offset >= ZIP64_MARKER_32 as u64
    }

    /// Write the trailer: Zip64 record and locator when needed, then the
    /// classic record.
    pub fn write_trailer<W: Write>(&self, writer: &mut W, force_zip64: bool) -> Result<()> {
        let mut trailer = Vec::with_capacity(98);
        if force_zip64 || self.needs_zip64() {
            let zip64_offset = self.offset + self.size;
            trailer.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
            trailer.extend_from_slice(&44u64.to_le_bytes());
            trailer.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
            trailer.extend_from_slice(&VERSION_ZIP64.to_le_bytes());
            trailer.extend_from_slice(&0u32.to_le_bytes());
            trailer.extend_from_slice(&0u32.to_le_bytes());
            trailer.extend_from_slice(&self.entries.to_le_bytes());
            trailer.extend_from_slice(&self.entries.to_le_bytes());
            trailer.extend_from_slice(&self.size.to_le_bytes());
            trailer.extend_from_slice(&self.offset.to_le_bytes());

            trailer.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG.to_le_bytes());
            trailer.extend_from_slice(&0u32.to_le_bytes());
            trailer.extend_from_slice(&zip64_offset.to_le_bytes());
            trailer.extend_from_slice(&1u32.to_le_bytes());
        }

        let entries_16 = if self.entries >= ZIP64_MARKER_16 as u64 {
            ZIP64_MARKER_16
        } else {
            self.entries as u16
        };
        trailer.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        trailer.extend_from_slice(&0u16.to_le_bytes());
        trailer.extend_from_slice(&0u16.to_le_bytes());
        trailer.extend_from_slice(&entries_16.to_le_bytes());
        trailer.extend_from_slice(&entries_16.to_le_bytes());
        trailer.extend_from_slice(&clamp32(self.size).to_le_bytes());
        trailer.extend_from_slice(&clamp32(self.offset).to_le_bytes());
        trailer.extend_from_slice(&0u16.to_le_bytes()); // comment length
        writer.write_all(&trailer)?;
        Ok(())
    }
}

//! Container entry metadata.
//!
//! A [`ContainerEntry`] describes one record of a PKZIP container as read
//! from its central directory. Timestamps are kept in raw DOS form so that
//! they can be re-emitted bit-exact.

use std::time::{SystemTime, UNIX_EPOCH};

/// Suffix that marks an entry as a nested container.
pub const NESTED_CONTAINER_SUFFIX: &str = ".jar";

/// Compression method used for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (stored).
    #[default]
    Stored,
    /// DEFLATE compression.
    Deflate,
    /// Unknown/unsupported method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Map a PKZIP method id.
    pub fn from_zip_id(id: u16) -> Self {
        match id {
            0 => Self::Stored,
            8 => Self::Deflate,
            other => Self::Unknown(other),
        }
    }

    /// PKZIP method id.
    pub fn zip_id(&self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => *id,
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflate => "Deflate",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// What an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// Ordinary payload.
    #[default]
    File,
    /// Directory marker (name ends with `/`, no payload).
    Directory,
    /// A container stored inside the container.
    NestedContainer,
}

impl EntryKind {
    /// Derive the kind from an entry path.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with('/') {
            Self::Directory
        } else if path.ends_with(NESTED_CONTAINER_SUFFIX) {
            Self::NestedContainer
        } else {
            Self::File
        }
    }
}

/// MS-DOS packed modification time as stored in PKZIP headers.
///
/// Two-second resolution, no time zone, years 1980..=2107.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DosDateTime {
    /// Packed time: hour << 11 | minute << 5 | second / 2.
    pub time: u16,
    /// Packed date: (year - 1980) << 9 | month << 5 | day.
    pub date: u16,
}

impl DosDateTime {
    /// Earliest representable instant, 1980-01-01 00:00:00.
    pub const MIN: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Wrap raw header fields.
    pub fn new(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// Convert a calendar instant (treated as UTC).
    pub fn from_system_time(t: SystemTime) -> Self {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;
        let (year, month, day) = civil_from_days(days);
        if year < 1980 {
            return Self::MIN;
        }
        let year = year.min(2107);
        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;
        Self {
            time: (hour << 11) | (minute << 5) | (second / 2),
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    /// Current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }
}

// Howard Hinnant's civil-from-days conversion.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

/// An entry in a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerEntry {
    /// Slash-separated, case-sensitive path within the container.
    pub name: String,
    /// What the entry holds.
    pub kind: EntryKind,
    /// Uncompressed payload size in bytes.
    pub size: u64,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// Compression method.
    pub method: CompressionMethod,
    /// Modification time, bit-exact from the header.
    pub modified: DosDateTime,
    /// CRC-32 of the uncompressed payload.
    pub crc32: u32,
    /// General purpose bit flags.
    pub flags: u16,
    /// Offset of the local header in the container.
    pub header_offset: u64,
    /// Offset of the payload in the container.
    pub data_offset: u64,
}

impl ContainerEntry {
    /// Create a file entry with the kind derived from its path.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: EntryKind::from_path(&name),
            name,
            ..Self::default()
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this is a nested container.
    pub fn is_nested(&self) -> bool {
        self.kind == EntryKind::NestedContainer
    }

    /// Check if the payload is encrypted with traditional PKZIP encryption.
    pub fn is_encrypted(&self) -> bool {
        self.flags & 0x0001 != 0
    }
}

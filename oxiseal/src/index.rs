//! Control entries and the encrypted-entry index.
//!
//! An encrypted container carries, under its base directory:
//!
//! ```text
//! {base}META-INF/oxiseal/            marker directory
//! {base}META-INF/oxiseal/INDEX.MF    one base-relative path per CRLF line
//! {base}META-INF/oxiseal/PASSWORD    optional, password + CRLF
//! ```

use oxiseal_archive::zip::{ZipReader, ZipWriter};
use oxiseal_core::entry::{CompressionMethod, DosDateTime};
use oxiseal_core::error::{OxiSealError, Result};
use std::collections::HashSet;
use std::io::{Read, Seek, Write};

/// Control directory below the base directory.
pub const CONTROL_DIR: &str = "META-INF/oxiseal/";

/// Index entry name inside the control directory.
pub const INDEX_NAME: &str = "INDEX.MF";

/// Credential entry name inside the control directory.
pub const CREDENTIAL_NAME: &str = "PASSWORD";

/// Where control entries live for one base directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlLayout {
    base: String,
    marker_dir: String,
    index_path: String,
    credential_path: String,
}

impl ControlLayout {
    /// Layout under `base`, which is empty or ends with `/`.
    pub fn new(base: &str) -> Self {
        let base = if base.is_empty() || base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };
        let marker_dir = format!("{}{}", base, CONTROL_DIR);
        Self {
            index_path: format!("{}{}", marker_dir, INDEX_NAME),
            credential_path: format!("{}{}", marker_dir, CREDENTIAL_NAME),
            marker_dir,
            base,
        }
    }

    /// Layout at the container root.
    pub fn root() -> Self {
        Self::new("")
    }

    /// Base directory.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Marker directory entry name.
    pub fn marker_dir(&self) -> &str {
        &self.marker_dir
    }

    /// Index entry name.
    pub fn index_path(&self) -> &str {
        &self.index_path
    }

    /// Credential entry name.
    pub fn credential_path(&self) -> &str {
        &self.credential_path
    }

    /// Whether `path` lies in the control namespace.
    pub fn is_control(&self, path: &str) -> bool {
        path.starts_with(&self.marker_dir)
    }

    /// `path` relative to the base directory.
    pub fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.base.as_str())
    }
}

impl Default for ControlLayout {
    fn default() -> Self {
        Self::root()
    }
}

/// Ordered set of base-relative paths that were encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedIndex {
    paths: Vec<String>,
    lookup: HashSet<String>,
}

impl EncryptedIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path`; returns `false` if it was already present.
    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if !self.lookup.insert(path.clone()) {
            return false;
        }
        self.paths.push(path);
        true
    }

    /// Whether `path` is in the index.
    pub fn contains(&self, path: &str) -> bool {
        self.lookup.contains(path)
    }

    /// Number of paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Serialize as CRLF-terminated UTF-8 lines.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.paths.iter().map(|p| p.len() + 2).sum());
        for path in &self.paths {
            out.extend_from_slice(path.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    /// Parse index bytes; accepts CRLF or LF and skips blank lines.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| OxiSealError::malformed_index(format!("not UTF-8: {}", e)))?;
        let mut index = Self::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            validate_path(line)?;
            index.insert(line);
        }
        Ok(index)
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(OxiSealError::malformed_index(format!(
            "absolute path: {}",
            path
        )));
    }
    if path.contains('\\') {
        return Err(OxiSealError::malformed_index(format!(
            "backslash in path: {}",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(OxiSealError::malformed_index(format!(
            "parent segment in path: {}",
            path
        )));
    }
    Ok(())
}

/// Appends control entries to a container being written.
#[derive(Debug, Clone)]
pub struct IndexWriter<'a> {
    layout: &'a ControlLayout,
}

impl<'a> IndexWriter<'a> {
    /// Writer for `layout`.
    pub fn new(layout: &'a ControlLayout) -> Self {
        Self { layout }
    }

    /// Write the marker directory, the index and, with `password`, the
    /// credential entry. Nothing is written for an empty index.
    pub fn write<W: Write>(
        &self,
        zip: &mut ZipWriter<W>,
        index: &EncryptedIndex,
        password: Option<&str>,
        modified: DosDateTime,
    ) -> Result<()> {
        if index.is_empty() {
            return Ok(());
        }
        zip.add_directory(self.layout.marker_dir(), modified)?;
        zip.add_entry(
            self.layout.index_path(),
            modified,
            CompressionMethod::Deflate,
            &index.to_bytes(),
        )?;
        if let Some(password) = password {
            let mut credential = Vec::with_capacity(password.len() + 2);
            credential.extend_from_slice(password.as_bytes());
            credential.extend_from_slice(b"\r\n");
            zip.add_entry(
                self.layout.credential_path(),
                modified,
                CompressionMethod::Deflate,
                &credential,
            )?;
        }
        Ok(())
    }
}

/// Reads control entries from an existing container.
#[derive(Debug, Clone)]
pub struct IndexReader<'a> {
    layout: &'a ControlLayout,
}

impl<'a> IndexReader<'a> {
    /// Reader for `layout`.
    pub fn new(layout: &'a ControlLayout) -> Self {
        Self { layout }
    }

    /// The container's index, or `None` if it has none.
    pub fn read<R: Read + Seek>(&self, zip: &mut ZipReader<R>) -> Result<Option<EncryptedIndex>> {
        let Some(entry) = zip.entry_by_name(self.layout.index_path()).cloned() else {
            return Ok(None);
        };
        let data = zip.extract(&entry)?;
        EncryptedIndex::parse(&data).map(Some)
    }

    /// First line of the credential entry, or `None` if there is none.
    pub fn read_password<R: Read + Seek>(&self, zip: &mut ZipReader<R>) -> Result<Option<String>> {
        let Some(entry) = zip.entry_by_name(self.layout.credential_path()).cloned() else {
            return Ok(None);
        };
        let data = zip.extract(&entry)?;
        let text = String::from_utf8_lossy(&data);
        let line = text.split('\n').next().unwrap_or_default();
        Ok(Some(line.strip_suffix('\r').unwrap_or(line).to_string()))
    }
}

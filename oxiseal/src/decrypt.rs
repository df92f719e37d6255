//! Decryption: whole containers and single entries.
//!
//! Both read the index first (pass 1) through the central directory, then
//! work from the in-memory set. Whole-container decryption re-transcodes
//! every entry in order (pass 2); [`SealedArchive`] instead seeks to the one
//! entry asked for.

use crate::cipher::{decrypt_bytes, decrypt_source};
use crate::index::{ControlLayout, EncryptedIndex, IndexReader};
use crate::key::KeyMaterial;
use crate::manifest::{MANIFEST_PATH, Manifest, ManifestPatcher};
use crate::transcode::{TranscodeReport, copy_entry, write_rebuilt};
use oxiseal_archive::zip::{EntryOptions, ZipReader, ZipWriter};
use oxiseal_core::error::{OxiSealError, Result};
use oxiseal_deflate::DEFAULT_LEVEL;
use std::io::{self, Cursor, Read, Seek, Write};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Whole-container decryptor.
#[derive(Debug)]
pub struct Decryptor<'a> {
    key: &'a KeyMaterial,
    layout: ControlLayout,
    patcher: ManifestPatcher,
    deflate_level: u8,
}

impl<'a> Decryptor<'a> {
    /// Decryptor for containers whose control entries sit under `layout`.
    pub fn new(key: &'a KeyMaterial, layout: ControlLayout) -> Self {
        Self {
            key,
            layout,
            patcher: ManifestPatcher::default(),
            deflate_level: DEFAULT_LEVEL,
        }
    }

    /// Restore the top-level manifest with `patcher`.
    pub fn with_manifest_patcher(mut self, patcher: ManifestPatcher) -> Self {
        self.patcher = patcher;
        self
    }

    /// DEFLATE level for rewritten entries.
    pub fn with_deflate_level(mut self, level: u8) -> Self {
        self.deflate_level = level;
        self
    }

    /// Decrypt `source` into `dest`.
    ///
    /// A container without an index is copied with control entries dropped.
    pub fn decrypt<R, W>(&self, source: R, dest: W) -> Result<TranscodeReport>
    where
        R: Read + Seek,
        W: Write,
    {
        let mut report = TranscodeReport::default();
        self.run(&self.layout, source, dest, 0, &mut report)?;
        info!(
            entries = report.entries,
            decrypted = report.transformed,
            nested = report.nested,
            depth = report.max_depth,
            manifest = report.manifest_rewritten,
            "container decrypted"
        );
        Ok(report)
    }

    /// Decrypt a nested container held in memory.
    pub(crate) fn decrypt_nested(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(data);
        }
        let mut report = TranscodeReport::default();
        self.run(&ControlLayout::root(), Cursor::new(data), Vec::new(), 1, &mut report)
    }

    fn run<R, W>(
        &self,
        layout: &ControlLayout,
        source: R,
        dest: W,
        depth: usize,
        report: &mut TranscodeReport,
    ) -> Result<W>
    where
        R: Read + Seek,
        W: Write,
    {
        let mut reader = ZipReader::new(source)?;
        let index = IndexReader::new(layout)
            .read(&mut reader)?
            .unwrap_or_default();
        if depth == 0 {
            report.indexed = index.len();
        }
        report.max_depth = report.max_depth.max(depth);

        let mut zip = ZipWriter::with_level(dest, self.deflate_level)?;
        for entry in reader.entries().to_vec() {
            report.entries += 1;
            if layout.is_control(&entry.name) {
                debug!(path = %entry.name, depth, "dropping control entry");
                report.skipped += 1;
                continue;
            }
            if entry.is_dir() {
                zip.add_directory(&entry.name, entry.modified)?;
                report.passthrough += 1;
                continue;
            }

            let indexed = layout
                .relative(&entry.name)
                .is_some_and(|relative| index.contains(relative));
            debug!(path = %entry.name, indexed, depth, "entry");

            if indexed && entry.is_nested() {
                let inner = reader.extract(&entry)?;
                let mut sink = zip.start_entry(EntryOptions::staged(&entry.name, entry.modified))?;
                if !inner.is_empty() {
                    self.run(
                        &ControlLayout::root(),
                        Cursor::new(inner),
                        &mut sink as &mut dyn Write,
                        depth + 1,
                        report,
                    )?;
                }
                sink.finish()?;
                report.nested += 1;
                report.transformed += 1;
            } else if indexed {
                let ciphertext = reader.extract(&entry)?;
                let mut plain = decrypt_source(self.key, ciphertext.as_slice())?;
                let mut sink =
                    zip.start_entry(EntryOptions::deflated(&entry.name, entry.modified))?;
                io::copy(&mut plain, &mut sink)?;
                sink.finish()?;
                report.transformed += 1;
            } else if depth == 0 && !index.is_empty() && entry.name == MANIFEST_PATH {
                let data = reader.extract(&entry)?;
                let mut manifest = Manifest::parse(&data)?;
                if self.patcher.restore(&mut manifest) {
                    debug!("restoring original Main-Class");
                    report.manifest_rewritten = true;
                    write_rebuilt(&mut zip, &entry, &manifest.to_bytes())?;
                } else {
                    write_rebuilt(&mut zip, &entry, &data)?;
                }
                report.passthrough += 1;
            } else {
                copy_entry(&mut reader, &mut zip, &entry)?;
                report.passthrough += 1;
            }
        }
        zip.into_inner()
    }
}

/// An encrypted container opened for on-demand, single-entry decryption.
///
/// The index is read once in [`SealedArchive::open`]. Lookups may come from
/// many threads; reads from the source are serialized internally.
pub struct SealedArchive<R> {
    reader: Mutex<ZipReader<R>>,
    index: EncryptedIndex,
    layout: ControlLayout,
    key: KeyMaterial,
}

impl<R: Read + Seek> SealedArchive<R> {
    /// Open `source` and read its index.
    pub fn open(source: R, key: KeyMaterial, layout: ControlLayout) -> Result<Self> {
        let mut reader = ZipReader::new(source)?;
        let index = IndexReader::new(&layout)
            .read(&mut reader)?
            .unwrap_or_default();
        debug!(
            entries = reader.len(),
            indexed = index.len(),
            "opened sealed container"
        );
        Ok(Self {
            reader: Mutex::new(reader),
            index,
            layout,
            key,
        })
    }

    /// The container's index.
    pub fn index(&self) -> &EncryptedIndex {
        &self.index
    }

    /// Control entry layout.
    pub fn layout(&self) -> &ControlLayout {
        &self.layout
    }

    /// Whether `name` was encrypted.
    pub fn is_encrypted(&self, name: &str) -> bool {
        self.layout
            .relative(name)
            .is_some_and(|relative| self.index.contains(relative))
    }

    /// Payload of `name` in plaintext.
    ///
    /// Encrypted files are decrypted, encrypted nested containers are
    /// decrypted recursively, everything else is returned as stored.
    pub fn decrypt_entry(&self, name: &str) -> Result<Vec<u8>> {
        let (entry, data) = {
            let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = reader
                .entry_by_name(name)
                .cloned()
                .ok_or_else(|| OxiSealError::entry_not_found(name))?;
            let data = reader.extract(&entry)?;
            (entry, data)
        };

        if !self.is_encrypted(name) {
            return Ok(data);
        }
        if entry.is_nested() {
            Decryptor::new(&self.key, ControlLayout::root()).decrypt_nested(data)
        } else {
            decrypt_bytes(&self.key, &data)
        }
    }
}

impl<R> std::fmt::Debug for SealedArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedArchive")
            .field("layout", &self.layout)
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

/// Password stored in the container's credential entry, if any.
///
/// Only the first line is returned.
pub fn read_embedded_password<R: Read + Seek>(
    source: R,
    layout: &ControlLayout,
) -> Result<Option<String>> {
    let mut reader = ZipReader::new(source)?;
    IndexReader::new(layout).read_password(&mut reader)
}

//! The encrypting transcode pass.
//!
//! One forward pass over the source's entries in central directory order.
//! Each entry is classified once; files are re-emitted encrypted or
//! unchanged, nested containers are staged in memory and transcoded
//! recursively, and leftover control entries are dropped. The index and
//! control entries are appended at the end.

use crate::cipher::encrypt_sink;
use crate::classify::{EntryClassifier, Policy};
use crate::index::{EncryptedIndex, IndexWriter};
use crate::key::KeyMaterial;
use crate::manifest::{MANIFEST_PATH, Manifest, ManifestPatcher};
use oxiseal_archive::zip::{EntryOptions, ZipReader, ZipWriter};
use oxiseal_core::entry::{CompressionMethod, ContainerEntry, DosDateTime};
use oxiseal_core::error::Result;
use oxiseal_deflate::DEFAULT_LEVEL;
use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use tracing::{debug, info, warn};

/// Counters from one transcode or decrypt run, nested containers included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeReport {
    /// Entries read.
    pub entries: usize,
    /// Entries encrypted (or decrypted), nested containers included.
    pub transformed: usize,
    /// Entries copied unchanged.
    pub passthrough: usize,
    /// Control entries dropped.
    pub skipped: usize,
    /// Nested containers recursed into.
    pub nested: usize,
    /// Deepest nesting level reached; 0 for the top level only.
    pub max_depth: usize,
    /// Whether the top-level manifest was rewritten.
    pub manifest_rewritten: bool,
    /// Paths recorded in the top-level index.
    pub indexed: usize,
}

/// Encrypting transcoder.
pub struct ArchiveTranscoder<'a> {
    key: &'a KeyMaterial,
    classifier: &'a EntryClassifier,
    patcher: ManifestPatcher,
    deflate_level: u8,
    password: Option<&'a str>,
}

impl<'a> ArchiveTranscoder<'a> {
    /// Transcoder with default manifest handling and compression level.
    pub fn new(key: &'a KeyMaterial, classifier: &'a EntryClassifier) -> Self {
        Self {
            key,
            classifier,
            patcher: ManifestPatcher::default(),
            deflate_level: DEFAULT_LEVEL,
            password: None,
        }
    }

    /// Use `patcher` for the top-level manifest.
    pub fn with_manifest_patcher(mut self, patcher: ManifestPatcher) -> Self {
        self.patcher = patcher;
        self
    }

    /// DEFLATE level for rewritten entries.
    pub fn with_deflate_level(mut self, level: u8) -> Self {
        self.deflate_level = level;
        self
    }

    /// Store `password` in the credential entry of every encrypted
    /// container. The key becomes recoverable from the output.
    pub fn with_embedded_password(mut self, password: &'a str) -> Self {
        self.password = Some(password);
        self
    }

    /// Encrypt `source` into `dest`.
    ///
    /// The source must be seekable: entries are located through its central
    /// directory, not by scanning local headers, so pipes have to be spooled
    /// to a file or buffer first. An empty source (zero bytes or no entries)
    /// produces an empty container.
    pub fn transcode<R, W>(&self, source: R, dest: W) -> Result<TranscodeReport>
    where
        R: Read + Seek,
        W: Write,
    {
        let mut report = TranscodeReport::default();
        let index = self.run(self.classifier, source, dest, 0, &mut report)?.1;
        report.indexed = index.len();
        info!(
            entries = report.entries,
            encrypted = report.transformed,
            nested = report.nested,
            depth = report.max_depth,
            manifest = report.manifest_rewritten,
            "container encrypted"
        );
        Ok(report)
    }

    fn run<R, W>(
        &self,
        classifier: &EntryClassifier,
        source: R,
        dest: W,
        depth: usize,
        report: &mut TranscodeReport,
    ) -> Result<(W, EncryptedIndex)>
    where
        R: Read + Seek,
        W: Write,
    {
        let mut reader = ZipReader::new(source)?;
        let mut zip = ZipWriter::with_level(dest, self.deflate_level)?;
        let layout = classifier.layout();
        let entries = reader.entries().to_vec();
        report.max_depth = report.max_depth.max(depth);

        // Policy depends on the path only, so whether the index will be
        // non-empty is known before anything is written.
        let will_encrypt = entries
            .iter()
            .any(|e| classifier.policy(e) == Policy::Encrypt);

        let mut index = EncryptedIndex::new();
        for entry in &entries {
            report.entries += 1;
            let policy = classifier.policy(entry);
            debug!(path = %entry.name, %policy, depth, "entry");

            match policy {
                Policy::Skip => {
                    warn!(path = %entry.name, "dropping leftover control entry");
                    report.skipped += 1;
                }
                Policy::Passthrough if entry.is_dir() => {
                    zip.add_directory(&entry.name, entry.modified)?;
                    report.passthrough += 1;
                }
                Policy::Passthrough => {
                    if depth == 0 && will_encrypt && entry.name == MANIFEST_PATH {
                        let data = reader.extract(entry)?;
                        let mut manifest = Manifest::parse(&data)?;
                        if self.patcher.patch(&mut manifest) {
                            debug!("redirecting Main-Class to the bootstrap entry point");
                            report.manifest_rewritten = true;
                            write_rebuilt(&mut zip, entry, &manifest.to_bytes())?;
                        } else {
                            write_rebuilt(&mut zip, entry, &data)?;
                        }
                    } else {
                        copy_entry(&mut reader, &mut zip, entry)?;
                    }
                    report.passthrough += 1;
                }
                Policy::Encrypt => {
                    if entry.is_nested() {
                        let inner = reader.extract(entry)?;
                        let mut sink =
                            zip.start_entry(EntryOptions::staged(&entry.name, entry.modified))?;
                        // Zero bytes is not a container; it stays zero bytes.
                        if !inner.is_empty() {
                            self.run(
                                &classifier.nested(),
                                Cursor::new(inner),
                                &mut sink as &mut dyn Write,
                                depth + 1,
                                report,
                            )?;
                        }
                        sink.finish()?;
                        report.nested += 1;
                    } else {
                        let mut sink =
                            zip.start_entry(EntryOptions::deflated(&entry.name, entry.modified))?;
                        let mut cipher = encrypt_sink(self.key, &mut sink)?;
                        reader.extract_to(entry, &mut cipher)?;
                        cipher.finish()?;
                        sink.finish()?;
                    }
                    // Only safe paths are encrypted, and those sit under the base.
                    let relative = layout.relative(&entry.name).unwrap_or(entry.name.as_str());
                    index.insert(relative);
                    report.transformed += 1;
                }
            }
        }

        IndexWriter::new(layout).write(&mut zip, &index, self.password, DosDateTime::now())?;
        Ok((zip.into_inner()?, index))
    }
}

impl fmt::Debug for ArchiveTranscoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveTranscoder")
            .field("classifier", self.classifier)
            .field("patcher", &self.patcher)
            .field("deflate_level", &self.deflate_level)
            .field("embed_password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

/// Copy an entry unchanged.
///
/// STORED files keep their CRC and size and are streamed straight through.
/// Nested containers are re-emitted STORED. Everything else is inflated and
/// written DEFLATE with a data descriptor.
pub(crate) fn copy_entry<R, W>(
    reader: &mut ZipReader<R>,
    zip: &mut ZipWriter<W>,
    entry: &ContainerEntry,
) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    let options = match entry.method {
        _ if entry.is_nested() => EntryOptions::staged(&entry.name, entry.modified),
        CompressionMethod::Stored => {
            EntryOptions::stored(&entry.name, entry.modified, entry.crc32, entry.size)
        }
        _ => EntryOptions::deflated(&entry.name, entry.modified),
    };
    let mut sink = zip.start_entry(options)?;
    reader.extract_to(entry, &mut sink)?;
    sink.finish()
}

/// Write a rebuilt payload in place of `entry`, keeping its timestamp.
pub(crate) fn write_rebuilt<W: Write>(
    zip: &mut ZipWriter<W>,
    entry: &ContainerEntry,
    data: &[u8],
) -> Result<()> {
    let method = match entry.method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflate,
    };
    zip.add_entry(&entry.name, entry.modified, method, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{AcceptAll, suffix};
    use crate::config::ContainerProfile;
    use crate::key::KeyDerivation;

    fn key() -> KeyMaterial {
        KeyDerivation::new(1)
            .unwrap()
            .derive("AES", 128, 128, "secret123")
            .unwrap()
    }

    fn container(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Vec::new());
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(name, DosDateTime::MIN).unwrap();
            } else {
                zip.add_entry(name, DosDateTime::MIN, CompressionMethod::Deflate, data)
                    .unwrap();
            }
        }
        zip.into_inner().unwrap()
    }

    fn names(bytes: &[u8]) -> Vec<String> {
        ZipReader::new(Cursor::new(bytes))
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    #[test]
    fn test_empty_source() {
        let key = key();
        let classifier = EntryClassifier::new(ContainerProfile::Jar, AcceptAll);
        let mut out = Vec::new();
        let report = ArchiveTranscoder::new(&key, &classifier)
            .transcode(Cursor::new(Vec::new()), &mut out)
            .unwrap();
        assert_eq!(report, TranscodeReport::default());
        assert!(ZipReader::new(Cursor::new(out)).unwrap().is_empty());
    }

    #[test]
    fn test_encrypts_and_indexes() {
        let key = key();
        let classifier = EntryClassifier::new(ContainerProfile::Jar, suffix(".class"));
        let source = container(&[
            ("a/", b""),
            ("a/A.class", b"class A"),
            ("a/notes.txt", b"plain"),
        ]);
        let mut out = Vec::new();
        let report = ArchiveTranscoder::new(&key, &classifier)
            .transcode(Cursor::new(source), &mut out)
            .unwrap();
        assert_eq!(report.transformed, 1);
        assert_eq!(report.passthrough, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(
            names(&out),
            [
                "a/",
                "a/A.class",
                "a/notes.txt",
                "META-INF/oxiseal/",
                "META-INF/oxiseal/INDEX.MF"
            ]
        );

        let mut reader = ZipReader::new(Cursor::new(out)).unwrap();
        let encrypted = reader.entry_by_name("a/A.class").unwrap().clone();
        let ciphertext = reader.extract(&encrypted).unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(
            crate::cipher::decrypt_bytes(&key, &ciphertext).unwrap(),
            b"class A"
        );
        let plain = reader.entry_by_name("a/notes.txt").unwrap().clone();
        assert_eq!(reader.extract(&plain).unwrap(), b"plain");
    }

    #[test]
    fn test_leftover_control_entries_dropped() {
        let key = key();
        let classifier = EntryClassifier::new(ContainerProfile::Jar, suffix(".class"));
        let source = container(&[
            ("META-INF/oxiseal/", b""),
            ("META-INF/oxiseal/INDEX.MF", b"old.class\r\n"),
            ("keep.txt", b"keep"),
        ]);
        let mut out = Vec::new();
        let report = ArchiveTranscoder::new(&key, &classifier)
            .transcode(Cursor::new(source), &mut out)
            .unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(names(&out), ["keep.txt"]);
    }

    #[test]
    fn test_embedded_password_is_opt_in() {
        let key = key();
        let classifier = EntryClassifier::new(ContainerProfile::Jar, AcceptAll);
        let source = container(&[("A.class", b"a")]);

        let mut plain = Vec::new();
        ArchiveTranscoder::new(&key, &classifier)
            .transcode(Cursor::new(source.clone()), &mut plain)
            .unwrap();
        assert!(!names(&plain).iter().any(|n| n.ends_with("PASSWORD")));

        let mut embedded = Vec::new();
        ArchiveTranscoder::new(&key, &classifier)
            .with_embedded_password("secret123")
            .transcode(Cursor::new(source), &mut embedded)
            .unwrap();
        assert_eq!(names(&embedded).last().unwrap(), "META-INF/oxiseal/PASSWORD");
    }

    #[test]
    fn test_stored_passthrough_stays_stored() {
        let key = key();
        let classifier = EntryClassifier::new(ContainerProfile::Jar, suffix(".class"));
        let mut zip = ZipWriter::new(Vec::new());
        zip.add_entry("img.png", DosDateTime::MIN, CompressionMethod::Stored, b"\x89PNG")
            .unwrap();
        let source = zip.into_inner().unwrap();

        let mut out = Vec::new();
        ArchiveTranscoder::new(&key, &classifier)
            .transcode(Cursor::new(source), &mut out)
            .unwrap();
        let reader = ZipReader::new(Cursor::new(out)).unwrap();
        assert_eq!(reader.entries()[0].method, CompressionMethod::Stored);
        assert_eq!(reader.entries()[0].crc32, oxiseal_core::Crc32::compute(b"\x89PNG"));
    }
}

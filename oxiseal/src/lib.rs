//! # OxiSeal
//!
//! Selective encryption of entries inside JAR/WAR containers.
//!
//! Protected entries are re-emitted AES-CBC encrypted; everything else is
//! copied unchanged and the output stays a valid container. A small index
//! under `META-INF/oxiseal/` records which paths were protected so the
//! [`Decryptor`] (or a class loader using [`SealedArchive`]) can restore
//! them. Containers nested inside containers are handled recursively.
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxiseal::{SealConfig, classify::suffix};
//! use std::fs::File;
//!
//! let config = SealConfig::default();
//! let source = File::open("app.jar").unwrap();
//! let dest = File::create("app.sealed.jar").unwrap();
//! let report = oxiseal::encrypt(source, dest, "secret", &config, suffix(".class")).unwrap();
//! println!("{} entries encrypted", report.transformed);
//! ```
//!
//! ## Layers
//!
//! - [`oxiseal_core`]: errors, CRC-32, entry model
//! - [`oxiseal_deflate`]: DEFLATE codec
//! - [`oxiseal_archive`]: container reader/writer
//! - this crate: key derivation, ciphers, classification, transcoding

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cipher;
pub mod classify;
pub mod config;
pub mod decrypt;
pub mod index;
pub mod key;
pub mod manifest;
pub mod transcode;

// Re-exports
pub use cipher::{DecryptReader, EncryptWriter, decrypt_source, encrypt_sink};
pub use classify::{EntryClassifier, EntryFilter, EntryFilterExt, Policy};
pub use config::{ContainerProfile, Overrides, SealConfig};
pub use decrypt::{Decryptor, SealedArchive, read_embedded_password};
pub use index::{ControlLayout, EncryptedIndex, IndexReader, IndexWriter};
pub use key::{CipherAlgorithm, KeyDerivation, KeyMaterial};
pub use manifest::{Manifest, ManifestPatcher};
pub use oxiseal_core::{ContainerEntry, ErrorKind, OxiSealError, Result};
pub use transcode::{ArchiveTranscoder, TranscodeReport};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

/// Encrypt the entries of `source` accepted by `filter` into `dest`.
///
/// The password is stored in the output only when
/// [`SealConfig::embed_password`] is set.
pub fn encrypt<R, W, F>(
    source: R,
    dest: W,
    password: &str,
    config: &SealConfig,
    filter: F,
) -> Result<TranscodeReport>
where
    R: Read + Seek,
    W: Write,
    F: EntryFilter + 'static,
{
    config.validate()?;
    let key = config.derive_key(password)?;
    let classifier = config.classifier(filter);
    let mut transcoder = ArchiveTranscoder::new(&key, &classifier)
        .with_manifest_patcher(config.manifest_patcher())
        .with_deflate_level(config.deflate_level);
    if config.embed_password {
        transcoder = transcoder.with_embedded_password(password);
    }
    transcoder.transcode(source, dest)
}

/// Restore the encrypted entries of `source` into `dest`.
pub fn decrypt<R, W>(source: R, dest: W, password: &str, config: &SealConfig) -> Result<TranscodeReport>
where
    R: Read + Seek,
    W: Write,
{
    config.validate()?;
    let key = config.derive_key(password)?;
    Decryptor::new(&key, config.layout())
        .with_manifest_patcher(config.manifest_patcher())
        .with_deflate_level(config.deflate_level)
        .decrypt(source, dest)
}

/// [`encrypt`] between two files.
pub fn encrypt_file<F: EntryFilter + 'static>(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    password: &str,
    config: &SealConfig,
    filter: F,
) -> Result<TranscodeReport> {
    let source = BufReader::new(File::open(source)?);
    let mut dest = BufWriter::new(File::create(dest)?);
    let report = encrypt(source, &mut dest, password, config, filter)?;
    dest.flush()?;
    Ok(report)
}

/// [`decrypt`] between two files.
pub fn decrypt_file(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    password: &str,
    config: &SealConfig,
) -> Result<TranscodeReport> {
    let source = BufReader::new(File::open(source)?);
    let mut dest = BufWriter::new(File::create(dest)?);
    let report = decrypt(source, &mut dest, password, config)?;
    dest.flush()?;
    Ok(report)
}

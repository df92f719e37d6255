//! Seal configuration.
//!
//! One immutable [`SealConfig`] is passed explicitly to every entry point.
//! It is plain serde data so it can live in a JSON file next to a build;
//! launch-time [`Overrides`] are layered on top of it.

use crate::classify::{EntryClassifier, EntryFilter};
use crate::index::ControlLayout;
use crate::key::{CipherAlgorithm, KeyDerivation, KeyMaterial};
use crate::manifest::ManifestPatcher;
use oxiseal_core::error::{OxiSealError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Default attribute that keeps the original `Main-Class`.
pub const DEFAULT_BACKUP_ATTRIBUTE: &str = "Boot-Main-Class";

/// Default bootstrap entry point written into `Main-Class`.
pub const DEFAULT_BOOTSTRAP_MAIN_CLASS: &str = "io.oxiseal.boot.SealLauncher";

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 10_000;

/// Container layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContainerProfile {
    /// Executable fat jar; classes under `BOOT-INF/classes/`.
    Boot,
    /// Web application archive; classes and libraries under `WEB-INF/`.
    War,
    /// Plain jar; everything outside `META-INF/`.
    #[default]
    Jar,
}

impl ContainerProfile {
    /// Directory that control entries are placed under.
    pub fn base(&self) -> &'static str {
        match self {
            Self::Boot => "BOOT-INF/classes/",
            Self::War => "WEB-INF/",
            Self::Jar => "",
        }
    }

    /// Whether `path` may ever be encrypted under this layout.
    pub fn is_safe(&self, path: &str) -> bool {
        match self {
            Self::Boot => path.starts_with("BOOT-INF/classes/"),
            Self::War => path.starts_with("WEB-INF/classes/") || path.starts_with("WEB-INF/lib/"),
            Self::Jar => !path.starts_with("META-INF/"),
        }
    }

    /// Control entry layout for this profile.
    pub fn layout(&self) -> ControlLayout {
        ControlLayout::new(self.base())
    }
}

impl fmt::Display for ContainerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boot => "boot",
            Self::War => "war",
            Self::Jar => "jar",
        };
        f.write_str(name)
    }
}

/// Everything that parameterizes encryption and decryption, except the
/// password and the entry filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Container layout.
    pub profile: ContainerProfile,
    /// Cipher algorithm name.
    pub algorithm: String,
    /// Key size in bits.
    pub key_size: u32,
    /// IV size in bits.
    pub iv_size: u32,
    /// PBKDF2 iteration count.
    pub kdf_iterations: u32,
    /// DEFLATE level for rewritten entries.
    pub deflate_level: u8,
    /// Store the password as plaintext inside the output container.
    ///
    /// Anyone holding the artifact can recover the key. Off by default.
    pub embed_password: bool,
    /// Attribute that receives the original `Main-Class`.
    pub backup_attribute: String,
    /// Entry point written into `Main-Class`.
    pub bootstrap_main_class: String,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            profile: ContainerProfile::default(),
            algorithm: CipherAlgorithm::Aes.name().to_string(),
            key_size: 128,
            iv_size: 128,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            deflate_level: oxiseal_deflate::DEFAULT_LEVEL,
            embed_password: false,
            backup_attribute: DEFAULT_BACKUP_ATTRIBUTE.to_string(),
            bootstrap_main_class: DEFAULT_BOOTSTRAP_MAIN_CLASS.to_string(),
        }
    }
}

impl SealConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OxiSealError::invalid_parameter(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| OxiSealError::invalid_parameter(format!("configuration: {}", e)))
    }

    /// Check every field without deriving a key.
    pub fn validate(&self) -> Result<()> {
        KeyDerivation::new(self.kdf_iterations)?.check(&self.algorithm, self.key_size, self.iv_size)?;
        if self.deflate_level > 9 {
            return Err(OxiSealError::invalid_parameter(format!(
                "deflate level {} outside 0..=9",
                self.deflate_level
            )));
        }
        if self.backup_attribute.is_empty() || self.bootstrap_main_class.is_empty() {
            return Err(OxiSealError::invalid_parameter(
                "manifest attribute names must not be empty",
            ));
        }
        Ok(())
    }

    /// Derive key material for `password`.
    pub fn derive_key(&self, password: &str) -> Result<KeyMaterial> {
        KeyDerivation::new(self.kdf_iterations)?.derive(
            &self.algorithm,
            self.key_size,
            self.iv_size,
            password,
        )
    }

    /// Control entry layout of the configured profile.
    pub fn layout(&self) -> ControlLayout {
        self.profile.layout()
    }

    /// Classifier for the configured profile and `filter`.
    pub fn classifier<F: EntryFilter + 'static>(&self, filter: F) -> EntryClassifier {
        EntryClassifier::new(self.profile, filter)
    }

    /// Manifest patcher with the configured attribute names.
    pub fn manifest_patcher(&self) -> ManifestPatcher {
        ManifestPatcher::new(&self.backup_attribute, &self.bootstrap_main_class)
    }
}

const ALGORITHM_FLAG: &str = "--seal.algorithm=";
const KEY_SIZE_FLAG: &str = "--seal.keysize=";
const IV_SIZE_FLAG: &str = "--seal.ivsize=";
const PASSWORD_FLAG: &str = "--seal.password=";

/// Launch-time settings taken from `--seal.*=` arguments.
#[derive(Default)]
pub struct Overrides {
    /// Cipher algorithm.
    pub algorithm: Option<String>,
    /// Key size in bits.
    pub key_size: Option<u32>,
    /// IV size in bits.
    pub iv_size: Option<u32>,
    password: Option<Zeroizing<String>>,
}

impl Overrides {
    /// Pick the recognized flags out of `args`; everything else is ignored.
    ///
    /// Flag names are matched case-insensitively, values are taken verbatim.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            if let Some(value) = strip_flag(arg, ALGORITHM_FLAG) {
                overrides.algorithm = Some(value.to_string());
            } else if let Some(value) = strip_flag(arg, KEY_SIZE_FLAG) {
                overrides.key_size = Some(parse_bits(KEY_SIZE_FLAG, value)?);
            } else if let Some(value) = strip_flag(arg, IV_SIZE_FLAG) {
                overrides.iv_size = Some(parse_bits(IV_SIZE_FLAG, value)?);
            } else if let Some(value) = strip_flag(arg, PASSWORD_FLAG) {
                overrides.password = Some(Zeroizing::new(value.to_string()));
            }
        }
        Ok(overrides)
    }

    /// Password given on the command line, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.as_str())
    }

    /// Layer these settings over `config`.
    pub fn apply(&self, config: &SealConfig) -> SealConfig {
        let mut config = config.clone();
        if let Some(algorithm) = &self.algorithm {
            config.algorithm = algorithm.clone();
        }
        if let Some(key_size) = self.key_size {
            config.key_size = key_size;
        }
        if let Some(iv_size) = self.iv_size {
            config.iv_size = iv_size;
        }
        config
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overrides")
            .field("algorithm", &self.algorithm)
            .field("key_size", &self.key_size)
            .field("iv_size", &self.iv_size)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn strip_flag<'a>(arg: &'a str, flag: &str) -> Option<&'a str> {
    let head = arg.get(..flag.len())?;
    head.eq_ignore_ascii_case(flag).then(|| &arg[flag.len()..])
}

fn parse_bits(flag: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| {
        OxiSealError::invalid_parameter(format!("{}{}: not a bit count", flag, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SealConfig::default();
        assert_eq!(config.profile, ContainerProfile::Jar);
        assert_eq!(config.algorithm, "AES");
        assert_eq!(config.key_size, 128);
        assert_eq!(config.iv_size, 128);
        assert_eq!(config.kdf_iterations, 10_000);
        assert!(!config.embed_password);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = SealConfig::from_json(r#"{"profile":"Boot","key_size":256}"#).unwrap();
        assert_eq!(config.profile, ContainerProfile::Boot);
        assert_eq!(config.key_size, 256);
        assert_eq!(config.backup_attribute, DEFAULT_BACKUP_ATTRIBUTE);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        let err = SealConfig::from_json(r#"{"key_size":100}"#).unwrap_err();
        assert_eq!(err.kind(), oxiseal_core::ErrorKind::InvalidParameter);
        assert!(SealConfig::from_json("not json").is_err());
        assert!(SealConfig::from_json(r#"{"deflate_level":11}"#).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SealConfig {
            profile: ContainerProfile::War,
            embed_password: true,
            ..SealConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(SealConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_profile_safety() {
        assert!(ContainerProfile::Boot.is_safe("BOOT-INF/classes/a/A.class"));
        assert!(!ContainerProfile::Boot.is_safe("BOOT-INF/lib/x.jar"));
        assert!(ContainerProfile::War.is_safe("WEB-INF/lib/x.jar"));
        assert!(!ContainerProfile::War.is_safe("WEB-INF/web.xml"));
        assert!(!ContainerProfile::War.is_safe("index.jsp"));
        assert!(ContainerProfile::Jar.is_safe("a/Main.class"));
        assert!(!ContainerProfile::Jar.is_safe("META-INF/MANIFEST.MF"));
    }

    #[test]
    fn test_overrides() {
        let args = [
            "--server.port=8080",
            "--SEAL.ALGORITHM=AES/CBC/PKCS5Padding",
            "--seal.keysize=256",
            "--seal.password=s3cret",
        ];
        let overrides = Overrides::parse(args).unwrap();
        assert_eq!(overrides.password(), Some("s3cret"));
        let config = overrides.apply(&SealConfig::default());
        assert_eq!(config.algorithm, "AES/CBC/PKCS5Padding");
        assert_eq!(config.key_size, 256);
        assert_eq!(config.iv_size, 128);
        assert!(!format!("{:?}", overrides).contains("s3cret"));
    }

    #[test]
    fn test_overrides_bad_number() {
        assert!(Overrides::parse(["--seal.ivsize=big"]).is_err());
    }
}

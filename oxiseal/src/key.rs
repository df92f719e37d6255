//! Key derivation.
//!
//! A password is stretched with PBKDF2-HMAC-SHA256 into `key || iv`. The
//! salt is bound to the algorithm and both sizes, so the same password
//! yields unrelated material for a different key size.

use hmac::Hmac;
use oxiseal_core::error::{OxiSealError, Result};
use pbkdf2::pbkdf2;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Supported cipher algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    /// AES in CBC mode with PKCS#7 padding.
    Aes,
}

impl CipherAlgorithm {
    /// Canonical short name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes => "AES",
        }
    }

    /// Full transformation name.
    pub fn transformation(&self) -> &'static str {
        match self {
            Self::Aes => "AES/CBC/PKCS5Padding",
        }
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        16
    }

    /// Allowed key sizes in bits.
    pub fn key_sizes(&self) -> &'static [u32] {
        &[128, 192, 256]
    }
}

impl FromStr for CipherAlgorithm {
    type Err = OxiSealError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("AES") || s.eq_ignore_ascii_case("AES/CBC/PKCS5Padding") {
            Ok(Self::Aes)
        } else {
            Err(OxiSealError::invalid_parameter(format!(
                "unsupported algorithm: {}",
                s
            )))
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.transformation())
    }
}

/// Derived key and IV.
///
/// Zeroized on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl KeyMaterial {
    /// Build from raw parts.
    pub fn new(algorithm: CipherAlgorithm, key: Vec<u8>, iv: Vec<u8>) -> Result<Self> {
        if !algorithm.key_sizes().contains(&(key.len() as u32 * 8)) {
            return Err(OxiSealError::invalid_parameter(format!(
                "{}-bit key not supported by {}",
                key.len() * 8,
                algorithm.name()
            )));
        }
        if iv.len() != algorithm.block_size() {
            return Err(OxiSealError::invalid_parameter(format!(
                "{}-bit IV not supported by {}",
                iv.len() * 8,
                algorithm.name()
            )));
        }
        Ok(Self { algorithm, key, iv })
    }

    /// Cipher algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// IV bytes.
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("key_bits", &(self.key.len() * 8))
            .field("iv_bits", &(self.iv.len() * 8))
            .finish_non_exhaustive()
    }
}

/// PBKDF2 password stretching.
#[derive(Debug, Clone, Copy)]
pub struct KeyDerivation {
    iterations: u32,
}

impl KeyDerivation {
    /// Derivation with the given PBKDF2 iteration count (at least 1).
    pub fn new(iterations: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(OxiSealError::invalid_parameter(
                "PBKDF2 iterations must be >= 1",
            ));
        }
        Ok(Self { iterations })
    }

    /// Iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Validate algorithm and sizes without deriving anything.
    pub fn check(&self, algorithm: &str, key_bits: u32, iv_bits: u32) -> Result<CipherAlgorithm> {
        let algorithm: CipherAlgorithm = algorithm.parse()?;
        if !algorithm.key_sizes().contains(&key_bits) {
            return Err(OxiSealError::invalid_parameter(format!(
                "{}-bit key not supported by {}",
                key_bits,
                algorithm.name()
            )));
        }
        if iv_bits as usize != algorithm.block_size() * 8 {
            return Err(OxiSealError::invalid_parameter(format!(
                "{}-bit IV not supported by {}",
                iv_bits,
                algorithm.name()
            )));
        }
        Ok(algorithm)
    }

    /// Derive key material; deterministic for equal inputs.
    pub fn derive(
        &self,
        algorithm: &str,
        key_bits: u32,
        iv_bits: u32,
        password: &str,
    ) -> Result<KeyMaterial> {
        let algorithm = self.check(algorithm, key_bits, iv_bits)?;
        if password.is_empty() {
            return Err(OxiSealError::invalid_parameter("password must not be empty"));
        }

        let key_len = key_bits as usize / 8;
        let iv_len = iv_bits as usize / 8;
        let salt = format!("oxiseal:{}:{}:{}", algorithm.name(), key_bits, iv_bits);
        let mut out = Zeroizing::new(vec![0u8; key_len + iv_len]);
        pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt.as_bytes(), self.iterations, &mut out)
            .map_err(|e| OxiSealError::crypto(format!("PBKDF2 failed: {e}")))?;

        KeyMaterial::new(algorithm, out[..key_len].to_vec(), out[key_len..].to_vec())
    }
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            iterations: crate::config::DEFAULT_KDF_ITERATIONS,
        }
    }
}

/// Derive key material with the default iteration count.
pub fn derive(algorithm: &str, key_bits: u32, iv_bits: u32, password: &str) -> Result<KeyMaterial> {
    KeyDerivation::default().derive(algorithm, key_bits, iv_bits, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxiseal_core::ErrorKind;

    fn fast() -> KeyDerivation {
        KeyDerivation::new(10).unwrap()
    }

    #[test]
    fn test_deterministic() {
        let a = fast().derive("AES", 128, 128, "secret123").unwrap();
        let b = fast().derive("aes/cbc/pkcs5padding", 128, 128, "secret123").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.iv(), b.iv());
        assert_eq!(a.key().len(), 16);
        assert_eq!(a.iv().len(), 16);
    }

    #[test]
    fn test_sizes_change_material() {
        let k128 = fast().derive("AES", 128, 128, "pw").unwrap();
        let k256 = fast().derive("AES", 256, 128, "pw").unwrap();
        assert_eq!(k256.key().len(), 32);
        assert_ne!(&k256.key()[..16], k128.key());
    }

    #[test]
    fn test_password_changes_material() {
        let a = fast().derive("AES", 192, 128, "one").unwrap();
        let b = fast().derive("AES", 192, 128, "two").unwrap();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_invalid_parameters() {
        for (alg, key, iv, pw) in [
            ("DES", 128, 128, "pw"),
            ("AES", 100, 128, "pw"),
            ("AES", 128, 64, "pw"),
            ("AES", 128, 128, ""),
        ] {
            let err = fast().derive(alg, key, iv, pw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{alg} {key} {iv}");
        }
        assert!(KeyDerivation::new(0).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = KeyMaterial::new(CipherAlgorithm::Aes, vec![0xAB; 16], vec![0xCD; 16]).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("key_bits: 128"));
        assert!(!debug.contains("171"));
        assert!(!debug.to_lowercase().contains("ab, "));
    }
}

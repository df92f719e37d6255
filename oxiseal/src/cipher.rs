//! Cipher stream wrappers.
//!
//! AES-CBC with PKCS#7 padding over `Write` sinks and `Read` sources.
//! Ciphertext is always `(len / 16 + 1) * 16` bytes: a full padding block
//! is added when the plaintext is block-aligned.

use crate::key::{CipherAlgorithm, KeyMaterial};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use oxiseal_core::error::{OxiSealError, Result};
use std::io::{self, Read, Write};

const BLOCK: usize = 16;

/// Read size for the decrypting source.
const CHUNK: usize = 8 * 1024;

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(key: &KeyMaterial) -> Result<Self> {
        let invalid =
            |e: aes::cipher::InvalidLength| OxiSealError::crypto(format!("cipher init failed: {e}"));
        match (key.algorithm(), key.key().len()) {
            (CipherAlgorithm::Aes, 16) => Ok(Self::Aes128(
                Aes128::new_from_slice(key.key()).map_err(invalid)?,
            )),
            (CipherAlgorithm::Aes, 24) => Ok(Self::Aes192(
                Aes192::new_from_slice(key.key()).map_err(invalid)?,
            )),
            (CipherAlgorithm::Aes, 32) => Ok(Self::Aes256(
                Aes256::new_from_slice(key.key()).map_err(invalid)?,
            )),
            (_, len) => Err(OxiSealError::crypto(format!(
                "no cipher for a {}-bit key",
                len * 8
            ))),
        }
    }

    fn encrypt(&self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// CBC state: cipher plus the previous ciphertext block.
struct Cbc {
    cipher: BlockCipher,
    chain: [u8; BLOCK],
}

impl Cbc {
    fn new(key: &KeyMaterial) -> Result<Self> {
        let mut chain = [0u8; BLOCK];
        chain.copy_from_slice(key.iv());
        Ok(Self {
            cipher: BlockCipher::new(key)?,
            chain,
        })
    }

    fn encrypt_blocks(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK) {
            let mut block = [0u8; BLOCK];
            for (b, (p, c)) in block.iter_mut().zip(chunk.iter().zip(&self.chain)) {
                *b = p ^ c;
            }
            let mut block = Block::from(block);
            self.cipher.encrypt(&mut block);
            chunk.copy_from_slice(&block);
            self.chain.copy_from_slice(&block);
        }
    }

    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK) {
            let mut next_chain = [0u8; BLOCK];
            next_chain.copy_from_slice(chunk);
            let mut block = Block::clone_from_slice(chunk);
            self.cipher.decrypt(&mut block);
            for (out, (p, c)) in chunk.iter_mut().zip(block.iter().zip(&self.chain)) {
                *out = p ^ c;
            }
            self.chain = next_chain;
        }
    }
}

/// Encrypting `Write` wrapper.
///
/// Call [`EncryptWriter::finish`] to emit the padded final block. Dropping
/// an unfinished wrapper writes it on a best-effort basis.
pub struct EncryptWriter<W: Write> {
    inner: Option<W>,
    cbc: Cbc,
    pending: Vec<u8>,
}

impl<W: Write> EncryptWriter<W> {
    /// Write the final padded block, flush, and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let result = self.finalize();
        let inner = self.inner.take();
        result?;
        inner.ok_or_else(|| OxiSealError::crypto("cipher stream already finished"))
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        let pad = BLOCK - self.pending.len();
        self.pending.resize(BLOCK, pad as u8);
        self.cbc.encrypt_blocks(&mut self.pending);
        inner.write_all(&self.pending)?;
        inner.flush()?;
        self.pending.clear();
        Ok(())
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::other("cipher stream already finished"))?;
        self.pending.extend_from_slice(buf);
        let full = self.pending.len() / BLOCK * BLOCK;
        if full > 0 {
            self.cbc.encrypt_blocks(&mut self.pending[..full]);
            inner.write_all(&self.pending[..full])?;
            self.pending.drain(..full);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for EncryptWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.finalize();
        }
    }
}

/// Decrypting `Read` wrapper.
///
/// The last ciphertext block is held back until the source is exhausted so
/// its padding can be checked and stripped.
pub struct DecryptReader<R: Read> {
    inner: R,
    cbc: Cbc,
    /// Ciphertext not yet decrypted.
    input: Vec<u8>,
    /// Plaintext ready to hand out.
    output: Vec<u8>,
    output_pos: usize,
    done: bool,
}

impl<R: Read> DecryptReader<R> {
    /// Get the wrapped source back.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self) -> Result<()> {
        self.output.clear();
        self.output_pos = 0;

        let start = self.input.len();
        self.input.resize(start + CHUNK, 0);
        let n = loop {
            match self.inner.read(&mut self.input[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.input.truncate(start);
                    return Err(e.into());
                }
            }
        };
        self.input.truncate(start + n);

        if n == 0 {
            self.done = true;
            if self.input.len() != BLOCK {
                return Err(OxiSealError::crypto(format!(
                    "ciphertext length is not a positive multiple of {} bytes",
                    BLOCK
                )));
            }
            let mut last = std::mem::take(&mut self.input);
            self.cbc.decrypt_blocks(&mut last);
            let pad = last[BLOCK - 1] as usize;
            if pad == 0 || pad > BLOCK || last[BLOCK - pad..].iter().any(|&b| b as usize != pad) {
                return Err(OxiSealError::crypto("bad padding"));
            }
            last.truncate(BLOCK - pad);
            self.output = last;
            return Ok(());
        }

        // Everything but the block that may turn out to be the last one.
        if self.input.len() > BLOCK {
            let ready = (self.input.len() - 1) / BLOCK * BLOCK;
            let mut rest = self.input.split_off(ready);
            std::mem::swap(&mut self.input, &mut rest);
            self.cbc.decrypt_blocks(&mut rest);
            self.output = rest;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.output_pos >= self.output.len() {
            if self.done {
                return Ok(0);
            }
            self.fill()?;
        }
        let n = buf.len().min(self.output.len() - self.output_pos);
        buf[..n].copy_from_slice(&self.output[self.output_pos..self.output_pos + n]);
        self.output_pos += n;
        Ok(n)
    }
}

/// Wrap `writer` so everything written to it is encrypted.
pub fn encrypt_sink<W: Write>(key: &KeyMaterial, writer: W) -> Result<EncryptWriter<W>> {
    Ok(EncryptWriter {
        inner: Some(writer),
        cbc: Cbc::new(key)?,
        pending: Vec::with_capacity(BLOCK * 2),
    })
}

/// Wrap `reader` so everything read from it is decrypted.
pub fn decrypt_source<R: Read>(key: &KeyMaterial, reader: R) -> Result<DecryptReader<R>> {
    Ok(DecryptReader {
        inner: reader,
        cbc: Cbc::new(key)?,
        input: Vec::with_capacity(CHUNK + BLOCK),
        output: Vec::new(),
        output_pos: 0,
        done: false,
    })
}

/// Encrypt a whole buffer.
pub fn encrypt_bytes(key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    let mut sink = encrypt_sink(key, Vec::with_capacity(data.len() + BLOCK))?;
    sink.write_all(data)?;
    sink.finish()
}

/// Decrypt a whole buffer.
pub fn decrypt_bytes(key: &KeyMaterial, data: &[u8]) -> Result<Vec<u8>> {
    let mut source = decrypt_source(key, data)?;
    let mut out = Vec::with_capacity(data.len());
    source.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyDerivation;
    use oxiseal_core::ErrorKind;

    fn key(bits: u32) -> KeyMaterial {
        KeyDerivation::new(1)
            .unwrap()
            .derive("AES", bits, 128, "secret123")
            .unwrap()
    }

    #[test]
    fn test_ciphertext_length() {
        let key = key(128);
        for len in [0, 1, 15, 16, 17, 31, 32, 100] {
            let ct = encrypt_bytes(&key, &vec![7u8; len]).unwrap();
            assert_eq!(ct.len(), (len / 16 + 1) * 16, "len {len}");
        }
    }

    #[test]
    fn test_nist_cbc_vector() {
        // SP 800-38A F.2.1, first block
        let key = KeyMaterial::new(
            CipherAlgorithm::Aes,
            vec![
                0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09,
                0xcf, 0x4f, 0x3c,
            ],
            (0u8..16).collect(),
        )
        .unwrap();
        let plaintext = [
            0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
            0x17, 0x2a,
        ];
        let ct = encrypt_bytes(&key, &plaintext).unwrap();
        assert_eq!(
            &ct[..16],
            &[
                0x76, 0x49, 0xab, 0xac, 0x81, 0x19, 0xb2, 0x46, 0xce, 0xe9, 0x8e, 0x9b, 0x12,
                0xe9, 0x19, 0x7d
            ]
        );
        assert_eq!(decrypt_bytes(&key, &ct).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_all_key_sizes() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
        for bits in [128, 192, 256] {
            let key = key(bits);
            let ct = encrypt_bytes(&key, &data).unwrap();
            assert_ne!(&ct[..32], &data[..32]);
            assert_eq!(decrypt_bytes(&key, &ct).unwrap(), data);
        }
    }

    #[test]
    fn test_small_writes_and_reads() {
        let key = key(128);
        let mut sink = encrypt_sink(&key, Vec::new()).unwrap();
        for byte in b"written one byte at a time" {
            sink.write_all(&[*byte]).unwrap();
        }
        let ct = sink.finish().unwrap();

        let mut source = decrypt_source(&key, ct.as_slice()).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = source.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"written one byte at a time");
    }

    #[test]
    fn test_drop_finalizes() {
        let key = key(128);
        let mut out = Vec::new();
        {
            let mut sink = encrypt_sink(&key, &mut out).unwrap();
            sink.write_all(b"abc").unwrap();
        }
        assert_eq!(out.len(), 16);
        assert_eq!(decrypt_bytes(&key, &out).unwrap(), b"abc");
    }

    #[test]
    fn test_bad_length_is_crypto_failure() {
        let key = key(128);
        for ct in [vec![], vec![0u8; 15], vec![0u8; 33]] {
            let err = decrypt_bytes(&key, &ct).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CryptoFailure);
        }
    }

    #[test]
    fn test_wrong_key_fails_padding() {
        let ct = encrypt_bytes(&key(128), b"some plaintext").unwrap();
        let other = KeyDerivation::new(1)
            .unwrap()
            .derive("AES", 128, 128, "not-the-password")
            .unwrap();
        // A wrong key yields valid padding with probability ~1/256.
        if let Err(err) = decrypt_bytes(&other, &ct) {
            assert_eq!(err.kind(), ErrorKind::CryptoFailure);
        }
    }
}

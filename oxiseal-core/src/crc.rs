//! CRC-32 (ISO 3309) as used by PKZIP entries.
//!
//! Data of 16 bytes or more goes through a slicing-by-8 loop over
//! `chunks_exact(8)`; shorter input uses the single table.

use std::io::{self, Write};

const POLY: u32 = 0xEDB88320;

/// CRC-32 slicing-by-8 lookup tables; table 0 is the classic byte table.
const CRC32_TABLES: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    let mut t = 1;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }

    tables
};

/// CRC-32 calculator (ISO 3309).
///
/// - Polynomial: 0x04C11DB7 (reflected: 0xEDB88320)
/// - Initial value and final XOR: 0xFFFFFFFF
///
/// # Example
///
/// ```
/// use oxiseal_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= 16 {
            crc32_slice8(&mut self.crc, data);
        } else {
            crc32_sw(&mut self.crc, data);
        }
    }

    /// Get the current CRC value (without finalizing).
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Finalize and return the CRC value.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Compute CRC-32 for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn crc32_sw(crc: &mut u32, data: &[u8]) {
    for &byte in data {
        let index = ((*crc ^ byte as u32) & 0xFF) as usize;
        *crc = CRC32_TABLES[0][index] ^ (*crc >> 8);
    }
}

#[inline]
fn crc32_slice8(crc: &mut u32, data: &[u8]) {
    let mut c = *crc;
    let mut chunks = data.chunks_exact(8);

    for bytes in &mut chunks {
        let crc_xor = c ^ u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        c = CRC32_TABLES[7][(crc_xor & 0xFF) as usize]
            ^ CRC32_TABLES[6][((crc_xor >> 8) & 0xFF) as usize]
            ^ CRC32_TABLES[5][((crc_xor >> 16) & 0xFF) as usize]
            ^ CRC32_TABLES[4][(crc_xor >> 24) as usize]
            ^ CRC32_TABLES[3][bytes[4] as usize]
            ^ CRC32_TABLES[2][bytes[5] as usize]
            ^ CRC32_TABLES[1][bytes[6] as usize]
            ^ CRC32_TABLES[0][bytes[7] as usize];
    }

    *crc = c;
    crc32_sw(crc, chunks.remainder());
}

/// A writer that tracks the CRC-32 and byte count of everything passed
/// through it.
///
/// Used wherever an entry's checksum must be known after its payload has
/// been streamed (data descriptors, staged nested containers).
#[derive(Debug)]
pub struct CrcWriter<W> {
    inner: W,
    crc: Crc32,
    count: u64,
}

impl<W: Write> CrcWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            count: 0,
        }
    }

    /// CRC-32 of the bytes written so far.
    pub fn crc(&self) -> u32 {
        self.crc.value()
    }

    /// Number of bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Borrow the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap, returning the writer, the CRC and the byte count.
    pub fn into_parts(self) -> (W, u32, u64) {
        let crc = self.crc.value();
        (self.inner, crc, self.count)
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(Crc32::compute(b""), 0x00000000);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_incremental_matches_oneshot() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut crc = Crc32::new();
        for chunk in data.chunks(7) {
            crc.update(chunk);
        }
        assert_eq!(crc.finalize(), Crc32::compute(&data));
    }

    #[test]
    fn test_crc32_slice8_matches_bytewise() {
        let data: Vec<u8> = (0..257u32).map(|i| (i ^ 0x5A) as u8).collect();
        let mut fast = 0xFFFFFFFFu32;
        let mut slow = 0xFFFFFFFFu32;
        crc32_slice8(&mut fast, &data);
        crc32_sw(&mut slow, &data);
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_crc_writer_tracks_count_and_crc() {
        let mut writer = CrcWriter::new(Vec::new());
        writer.write_all(b"12345").unwrap();
        writer.write_all(b"6789").unwrap();
        assert_eq!(writer.count(), 9);
        let (inner, crc, count) = writer.into_parts();
        assert_eq!(inner, b"123456789");
        assert_eq!(crc, 0xCBF43926);
        assert_eq!(count, 9);
    }
}

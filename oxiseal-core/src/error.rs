//! Error types for OxiSeal operations.
//!
//! Every failure in the workspace is an [`OxiSealError`]. Callers that only
//! care about the broad category (I/O, malformed container, bad argument,
//! cipher failure) use [`OxiSealError::kind`].

use std::io;
use thiserror::Error;

/// Broad failure category of an [`OxiSealError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Read/write/seek fault on a source or destination stream.
    IoFailure,
    /// Input is not a valid container, or its index/manifest is malformed.
    FormatError,
    /// Unsupported algorithm or size, or otherwise unusable caller input.
    InvalidParameter,
    /// Cipher initialization or transform failure (bad padding, truncated block).
    CryptoFailure,
}

/// The main error type for OxiSeal operations.
#[derive(Debug, Error)]
pub enum OxiSealError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Invalid magic number in a container record.
    #[error("Invalid magic number: expected {expected:#010x}, found {found:#010x}")]
    InvalidMagic {
        /// Expected signature.
        expected: u32,
        /// Signature actually read.
        found: u32,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from the container.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// Invalid Huffman code encountered during inflation.
    #[error("Invalid Huffman code at bit position {bit_position}")]
    InvalidHuffmanCode {
        /// Bit position where the invalid code was found.
        bit_position: u64,
    },

    /// Corrupted compressed data.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid container header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of file: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// The embedded index of protected entries could not be parsed.
    #[error("Malformed index: {message}")]
    MalformedIndex {
        /// Description of the problem.
        message: String,
    },

    /// Caller supplied an unusable argument.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the rejected parameter.
        message: String,
    },

    /// Entry not found in the container.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Cipher failure.
    #[error("Crypto failure: {message}")]
    Crypto {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for OxiSeal operations.
pub type Result<T> = std::result::Result<T, OxiSealError>;

impl OxiSealError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: u32, found: u32) -> Self {
        Self::InvalidMagic { expected, found }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(bit_position: u64) -> Self {
        Self::InvalidHuffmanCode { bit_position }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create a malformed index error.
    pub fn malformed_index(message: impl Into<String>) -> Self {
        Self::MalformedIndex {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create a crypto failure.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::InvalidMagic { .. }
            | Self::UnsupportedMethod { .. }
            | Self::CrcMismatch { .. }
            | Self::InvalidHuffmanCode { .. }
            | Self::CorruptedData { .. }
            | Self::InvalidHeader { .. }
            | Self::UnexpectedEof { .. }
            | Self::MalformedIndex { .. } => ErrorKind::FormatError,
            Self::InvalidParameter { .. } | Self::EntryNotFound { .. } => {
                ErrorKind::InvalidParameter
            }
            Self::Crypto { .. } => ErrorKind::CryptoFailure,
        }
    }
}

impl From<io::Error> for OxiSealError {
    /// Unwraps errors that crossed a `Read`/`Write` boundary so their
    /// original category survives.
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|e| e.is::<OxiSealError>()) {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<OxiSealError>()) {
            Some(Ok(inner)) => *inner,
            _ => Self::Io(io::Error::other("wrapped error lost in conversion")),
        }
    }
}

impl From<OxiSealError> for io::Error {
    fn from(err: OxiSealError) -> Self {
        match err {
            OxiSealError::Io(e) => e,
            other => {
                let kind = match other.kind() {
                    ErrorKind::InvalidParameter => io::ErrorKind::InvalidInput,
                    _ => io::ErrorKind::InvalidData,
                };
                io::Error::new(kind, other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OxiSealError::invalid_magic(0x04034B50, 0x08074B50);
        assert!(err.to_string().contains("Invalid magic"));

        let err = OxiSealError::crc_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC mismatch"));

        let err = OxiSealError::unsupported_method("LZMA");
        assert!(err.to_string().contains("LZMA"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OxiSealError = io_err.into();
        assert!(matches!(err, OxiSealError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            OxiSealError::malformed_index("bad").kind(),
            ErrorKind::FormatError
        );
        assert_eq!(
            OxiSealError::invalid_parameter("keysize").kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            OxiSealError::crypto("padding").kind(),
            ErrorKind::CryptoFailure
        );
        assert_eq!(
            OxiSealError::entry_not_found("a.class").kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_roundtrip_through_io_error() {
        let err: io::Error = OxiSealError::crypto("bad padding").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<OxiSealError>())
            .map(OxiSealError::kind);
        assert_eq!(inner, Some(ErrorKind::CryptoFailure));

        let back: OxiSealError = err.into();
        assert!(matches!(back, OxiSealError::Crypto { .. }));
    }
}

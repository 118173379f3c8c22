//! Error types for RAR parsing and decompression.
//!
//! The main error type is [`RarError`], which covers all possible errors
//! that can occur when parsing or extracting RAR archives.

use std::fmt;
use std::io;

/// Error type for RAR operations.
///
/// This enum covers all possible errors that can occur when parsing,
/// decompressing, or decrypting RAR archives.
#[derive(Debug)]
pub enum RarError {
    /// The file does not have a valid RAR signature.
    InvalidSignature,
    /// A header in the archive is malformed or corrupt.
    InvalidHeader,
    /// An unknown or unsupported header type was encountered.
    InvalidHeaderType(u8),
    /// The compression method is not supported.
    DecompressionNotSupported(u8),
    /// The archive is encrypted but the `crypto` feature is not enabled.
    EncryptedNotSupported,
    /// The archive is encrypted but no password was provided.
    PasswordRequired,
    /// Decryption failed (wrong password or corrupt data).
    DecryptionFailed(String),
    /// The provided buffer is too small.
    BufferTooSmall {
        /// Bytes needed
        needed: usize,
        /// Bytes available
        have: usize,
    },
    /// An invalid file offset was requested.
    InvalidOffset {
        /// Requested offset
        offset: u64,
        /// File length
        length: u64,
    },
    /// An I/O error occurred.
    Io(io::Error),
    /// No files were found in the archive.
    NoFilesFound,
    /// RAR5 format detected but a specific feature is not supported.
    Rar5NotFullySupported,
    /// A declared dictionary/window size exceeds what this implementation
    /// will allocate.
    DictionaryTooLarge {
        /// The size the archive requested, in bytes.
        requested: u64,
        /// The largest size this implementation accepts, in bytes.
        max: u64,
    },
    /// A file block's `continues_in_next` flag wasn't matched by a
    /// `continues_from_previous` block with the same name at the start of
    /// the next volume.
    VolumeDiscontinuity {
        /// The inner file name whose continuation didn't match.
        name: String,
    },
    /// A file's `continues_in_next` flag was never resolved because the
    /// volume set ran out before the continuation arrived.
    VolumeMissing {
        /// The inner file name still owed a continuation.
        name: String,
    },
    /// A fragment-local decompression failure.
    Decompress(crate::decompress::DecompressError),
    /// A read was requested on a file that is not the first member of a
    /// solid compression group. This decoder keeps decompressor state
    /// per-`InnerFile`, so a solid file's dictionary (carried over from the
    /// previous file in scan order) is not available; see `DESIGN.md`.
    SolidRandomAccessUnsupported {
        /// The inner file name that would have required the prior solid
        /// group member's decoder state.
        name: String,
    },
}

impl fmt::Display for RarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "Invalid RAR signature"),
            Self::InvalidHeader => write!(f, "Invalid or malformed header"),
            Self::InvalidHeaderType(t) => write!(f, "Invalid header type: {}", t),
            Self::DecompressionNotSupported(m) => {
                write!(f, "Decompression not supported (method: 0x{:02x})", m)
            }
            Self::EncryptedNotSupported => write!(f, "Encrypted archives not supported"),
            Self::PasswordRequired => write!(f, "Password required for encrypted file"),
            Self::DecryptionFailed(msg) => write!(f, "Decryption failed: {}", msg),
            Self::BufferTooSmall { needed, have } => {
                write!(f, "Buffer too small: need {} bytes, have {}", needed, have)
            }
            Self::InvalidOffset { offset, length } => {
                write!(f, "Invalid offset: {} (file length: {})", offset, length)
            }
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::NoFilesFound => write!(f, "No files found in archive"),
            Self::Rar5NotFullySupported => {
                write!(
                    f,
                    "RAR5 format detected but decompression not yet supported"
                )
            }
            Self::DictionaryTooLarge { requested, max } => {
                write!(
                    f,
                    "dictionary size {} bytes exceeds the {} byte limit",
                    requested, max
                )
            }
            Self::VolumeDiscontinuity { name } => {
                write!(
                    f,
                    "volume continuation for '{}' did not match the next volume's first file block",
                    name
                )
            }
            Self::VolumeMissing { name } => {
                write!(
                    f,
                    "archive ended while '{}' still expected a continuation volume",
                    name
                )
            }
            Self::Decompress(e) => write!(f, "decompression error: {}", e),
            Self::SolidRandomAccessUnsupported { name } => {
                write!(
                    f,
                    "'{}' is part of a solid compression group; random access into \
                     non-first members of a solid group is not supported",
                    name
                )
            }
        }
    }
}

impl std::error::Error for RarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decompress(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RarError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<crate::decompress::DecompressError> for RarError {
    fn from(e: crate::decompress::DecompressError) -> Self {
        match e {
            crate::decompress::DecompressError::UnsupportedMethod(m) => {
                Self::DecompressionNotSupported(m)
            }
            crate::decompress::DecompressError::DictionaryTooLarge { requested, max } => {
                Self::DictionaryTooLarge { requested, max }
            }
            other => Self::Decompress(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RarError>;

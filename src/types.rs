//! Core types and enums for encryptor.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::format::ContainerHeader;
use crate::registry::{CipherAlg, KdfAlg};

/// Default read size for the streaming loop (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 600_000;

/// Default salt length in bytes.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Parameters chosen by the caller for an encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptParams {
    pub cipher: CipherAlg,
    pub kdf: KdfAlg,
    pub kdf_iterations: u32,
    /// Number of key bytes to derive. Must match the cipher's key length.
    pub key_len: usize,
    pub salt_len: usize,
    /// Bytes read from the input per loop iteration.
    pub chunk_size: usize,
}

impl Default for EncryptParams {
    fn default() -> Self {
        let cipher = CipherAlg::default();
        Self {
            cipher,
            kdf: KdfAlg::default(),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            key_len: cipher.key_len(),
            salt_len: DEFAULT_SALT_LEN,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EncryptParams {
    /// Parameters for `cipher` with its natural key length and defaults elsewhere.
    pub fn for_cipher(cipher: CipherAlg) -> Self {
        Self {
            cipher,
            key_len: cipher.key_len(),
            ..Default::default()
        }
    }

    /// Reject zero-valued parameters before any work starts.
    pub fn validate(&self) -> Result<(), EncryptorError> {
        if self.kdf_iterations == 0 {
            return Err(EncryptorError::InvalidArgument(
                "key derivation iterations must be at least 1",
            ));
        }
        if self.key_len == 0 {
            return Err(EncryptorError::InvalidArgument(
                "key length must be at least 1 byte",
            ));
        }
        if self.salt_len == 0 {
            return Err(EncryptorError::InvalidArgument(
                "salt length must be at least 1 byte",
            ));
        }
        if self.chunk_size == 0 {
            return Err(EncryptorError::InvalidArgument("chunk size must be > 0"));
        }
        Ok(())
    }
}

/// Outcome of a completed encrypt or decrypt call.
#[derive(Debug, Clone)]
pub struct Report {
    /// Path of the file that was written.
    pub output: PathBuf,
    /// Header that was written (encrypt) or read (decrypt).
    pub header: ContainerHeader,
    /// Plaintext bytes consumed (encrypt) or produced (decrypt).
    pub plaintext_bytes: u64,
    pub elapsed: Duration,
}

/// Library error type (no panics for expected failures).
#[derive(Error, Debug)]
pub enum EncryptorError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("invalid padding (wrong password or corrupted file)")]
    InvalidPadding,
    #[error("{} input path does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("not supported: {0}")]
    NotSupportedOperation(&'static str),
    #[error("{} already exists", .0.display())]
    OutputAlreadyExists(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("{cipher} needs a {expected}-byte key, got {actual}")]
    InvalidKeyLength {
        cipher: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("random number generator failure")]
    Entropy,
    #[error("operation cancelled")]
    Cancelled,
}

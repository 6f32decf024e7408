//! Name registry for the supported block ciphers and key derivation functions.
//!
//! The registry is closed: every algorithm is a variant of [`CipherAlg`] or
//! [`KdfAlg`], and its canonical name is what gets stored in a container header.
//! Lookups are case-insensitive.

use std::fmt;
use std::str::FromStr;

use crate::types::EncryptorError;

/// Supported block ciphers (CBC mode, PKCS#7 padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherAlg {
    /// AES with a 128-bit key.
    Aes128Cbc,
    /// AES with a 192-bit key.
    Aes192Cbc,
    /// AES with a 256-bit key. Default.
    #[default]
    Aes256Cbc,
}

impl CipherAlg {
    /// Every registered cipher, in registry order.
    pub const ALL: [CipherAlg; 3] = [
        CipherAlg::Aes128Cbc,
        CipherAlg::Aes192Cbc,
        CipherAlg::Aes256Cbc,
    ];

    /// Look up a cipher by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, EncryptorError> {
        match normalize(name).as_str() {
            "aes-128-cbc" => Ok(CipherAlg::Aes128Cbc),
            "aes-192-cbc" => Ok(CipherAlg::Aes192Cbc),
            "aes-256-cbc" => Ok(CipherAlg::Aes256Cbc),
            _ => Err(EncryptorError::UnsupportedAlgorithm(format!(
                "{name} cipher not supported"
            ))),
        }
    }

    /// Canonical name, as written to container headers.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlg::Aes128Cbc => "aes-128-cbc",
            CipherAlg::Aes192Cbc => "aes-192-cbc",
            CipherAlg::Aes256Cbc => "aes-256-cbc",
        }
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlg::Aes128Cbc => 16,
            CipherAlg::Aes192Cbc => 24,
            CipherAlg::Aes256Cbc => 32,
        }
    }

    /// Block length in bytes; also the IV length.
    pub fn block_len(&self) -> usize {
        16
    }
}

impl fmt::Display for CipherAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherAlg {
    type Err = EncryptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Supported password-based key derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KdfAlg {
    /// PBKDF2-HMAC-SHA1 (RFC 2898).
    Pbkdf2Sha1,
    /// PBKDF2-HMAC-SHA256. Default.
    #[default]
    Pbkdf2Sha256,
    /// PBKDF2-HMAC-SHA512.
    Pbkdf2Sha512,
}

impl KdfAlg {
    /// Every registered KDF, in registry order.
    pub const ALL: [KdfAlg; 3] = [KdfAlg::Pbkdf2Sha1, KdfAlg::Pbkdf2Sha256, KdfAlg::Pbkdf2Sha512];

    /// Look up a KDF by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, EncryptorError> {
        match normalize(name).as_str() {
            "pbkdf2-sha1" => Ok(KdfAlg::Pbkdf2Sha1),
            "pbkdf2-sha256" => Ok(KdfAlg::Pbkdf2Sha256),
            "pbkdf2-sha512" => Ok(KdfAlg::Pbkdf2Sha512),
            _ => Err(EncryptorError::UnsupportedAlgorithm(format!(
                "{name} key derivation not supported"
            ))),
        }
    }

    /// Canonical name, as written to container headers.
    pub fn name(&self) -> &'static str {
        match self {
            KdfAlg::Pbkdf2Sha1 => "pbkdf2-sha1",
            KdfAlg::Pbkdf2Sha256 => "pbkdf2-sha256",
            KdfAlg::Pbkdf2Sha512 => "pbkdf2-sha512",
        }
    }
}

impl fmt::Display for KdfAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KdfAlg {
    type Err = EncryptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

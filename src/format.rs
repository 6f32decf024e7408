//! On-disk container header and its length-prefixed framing.
//!
//! A container is laid out as
//!
//! ```text
//! [u32 LE: header length N][N bytes: UTF-8 JSON header][CBC ciphertext]
//! ```
//!
//! The header is a flat JSON object with PascalCase keys; byte fields are
//! standard base64. It is written once, before any ciphertext, and never
//! rewritten.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::registry::{CipherAlg, KdfAlg};
use crate::types::EncryptorError;

/// Upper bound accepted for the header length prefix.
pub const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Size of the header length prefix.
pub const HEADER_LEN_PREFIX: usize = 4;

/// Which operation a header was produced for. `Unknown` is never valid on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    #[default]
    Unknown = 0,
    Encrypt = 1,
    Decrypt = 2,
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Operation::Unknown),
            1 => Ok(Operation::Encrypt),
            2 => Ok(Operation::Decrypt),
            other => Err(format!("unknown operation {other}")),
        }
    }
}

/// Metadata stored in front of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerHeader {
    /// Original plaintext file name.
    pub filename: String,
    pub operation: Operation,
    pub key_derivation_algorithm: String,
    pub key_derivation_iterations: u32,
    pub key_length: usize,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub cipher_algorithm: String,
    #[serde(with = "b64")]
    pub initialization_vector: Vec<u8>,
}

impl ContainerHeader {
    /// Serialize to the UTF-8 JSON form written on disk.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncryptorError> {
        serde_json::to_vec(self)
            .map_err(|e| EncryptorError::MalformedHeader(format!("cannot serialize: {e}")))
    }

    /// Parse the UTF-8 JSON form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptorError> {
        serde_json::from_slice(bytes).map_err(|e| EncryptorError::MalformedHeader(e.to_string()))
    }

    /// Cipher named by the header, including the AES provider names written by
    /// earlier releases. Those carry no key size, so it is taken from `key_length`.
    pub fn cipher(&self) -> Result<CipherAlg, EncryptorError> {
        match folded(&self.cipher_algorithm).as_str() {
            "aescsp" | "aesmanaged" | "aescng" => Ok(match self.key_length {
                16 => CipherAlg::Aes128Cbc,
                24 => CipherAlg::Aes192Cbc,
                _ => CipherAlg::Aes256Cbc,
            }),
            _ => CipherAlg::from_name(&self.cipher_algorithm),
        }
    }

    /// Key derivation named by the header. `rfc2898` is PBKDF2-HMAC-SHA1.
    pub fn kdf(&self) -> Result<KdfAlg, EncryptorError> {
        match folded(&self.key_derivation_algorithm).as_str() {
            "rfc2898" => Ok(KdfAlg::Pbkdf2Sha1),
            _ => KdfAlg::from_name(&self.key_derivation_algorithm),
        }
    }

    /// Check the fields a decryption depends on.
    pub fn validate_for_decrypt(&self) -> Result<(), EncryptorError> {
        let bad = |msg: &str| Err(EncryptorError::MalformedHeader(msg.to_owned()));
        if self.operation != Operation::Encrypt {
            return bad("operation is not encrypt");
        }
        if self.salt.is_empty() {
            return bad("empty salt");
        }
        if self.initialization_vector.is_empty() {
            return bad("empty initialization vector");
        }
        if self.key_derivation_iterations == 0 {
            return bad("zero key derivation iterations");
        }
        if self.key_length == 0 {
            return bad("zero key length");
        }
        Ok(())
    }

    /// The bare file name the plaintext should be restored to.
    ///
    /// Only the last path component is used, split on both `/` and `\`.
    pub fn output_name(&self) -> Result<&str, EncryptorError> {
        let name = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        if name.is_empty() || name == "." || name == ".." {
            return Err(EncryptorError::MalformedHeader(format!(
                "unusable filename {:?}",
                self.filename
            )));
        }
        Ok(name)
    }
}

fn folded(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Write the length prefix followed by the header bytes.
pub async fn write_header<W>(
    writer: &mut W,
    header: &ContainerHeader,
) -> Result<usize, EncryptorError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = header.to_bytes()?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|n| *n <= MAX_HEADER_LEN)
        .ok_or_else(|| EncryptorError::MalformedHeader("header too large".into()))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&bytes).await?;
    Ok(HEADER_LEN_PREFIX + bytes.len())
}

/// Read the length prefix and exactly that many header bytes.
pub async fn read_header<R>(reader: &mut R) -> Result<ContainerHeader, EncryptorError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; HEADER_LEN_PREFIX];
    read_exact_or_malformed(reader, &mut prefix, "truncated header length").await?;
    let len = u32::from_le_bytes(prefix);
    if len == 0 || len > MAX_HEADER_LEN {
        return Err(EncryptorError::MalformedHeader(format!(
            "header length {len} out of range"
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    read_exact_or_malformed(reader, &mut bytes, "truncated header").await?;
    ContainerHeader::from_bytes(&bytes)
}

async fn read_exact_or_malformed<R>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), EncryptorError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(EncryptorError::MalformedHeader(what.to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Serde adapter storing byte vectors as standard base64 strings (`null` reads as empty).
mod b64 {
    use base64::{Engine, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => general_purpose::STANDARD.decode(s).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

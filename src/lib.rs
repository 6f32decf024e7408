#![forbid(unsafe_code)]
//! # encryptor: password-based encrypted containers for single files.
//!
//! `encryptor` turns one file into a self-describing container: a
//! length-prefixed JSON header recording everything needed to reverse the
//! operation (cipher, key derivation and its parameters, salt, IV, original
//! file name), followed by the CBC-encrypted file contents.
//!
//! ## Features
//! - **Streaming** encryption and decryption in constant memory over async file I/O
//! - **AES-CBC** (128/192/256-bit keys) with PKCS#7 padding
//! - **Password-based key derivation** using PBKDF2 (HMAC-SHA1/SHA256/SHA512)
//! - **Case-insensitive algorithm registry** whose canonical names are stored in the header
//! - **Create-new output**: existing files are never overwritten, failed or
//!   cancelled runs leave nothing behind
//!
//! ## Example: Encrypt and decrypt a file
//! ```no_run
//! use encryptor::{EncryptParams, decrypt_file, encrypt_file};
//! use secrecy::SecretString;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), encryptor::EncryptorError> {
//! let password = SecretString::new("mypassword".into());
//! let params = EncryptParams::default();
//!
//! let enc = encrypt_file(Path::new("notes.txt"), None, &password, &params).await?;
//! std::fs::remove_file("notes.txt")?;
//! let dec = decrypt_file(&enc.output, &password).await?;
//! assert_eq!(dec.output, Path::new("./notes.txt"));
//! # Ok(())
//! # }
//! ```
//!
//! Safety notes
//! - The container is **not authenticated**. A wrong password or corrupted
//!   file is usually caught by the padding check, but tampering is not
//!   detected in general.
//! - The crate is not audited or reviewed! Protects data at rest. Does not
//!   defend against compromised hosts/side channels.

mod crypto;
mod file;
mod format;
mod kdf;
mod registry;
mod streaming;
mod types;

// Re-export public API from modules
pub use crypto::{CbcDecryptor, CbcEncryptor, Transform, generate_iv, generate_salt};
pub use file::{ENCRYPTED_EXTENSION, decrypted_output_path, encrypted_output_path};
pub use format::{
    ContainerHeader, HEADER_LEN_PREFIX, MAX_HEADER_LEN, Operation, read_header, write_header,
};
pub use kdf::{DerivedKey, KeyDerivation, derive_key};
pub use registry::{CipherAlg, KdfAlg};
pub use streaming::{
    Stage, decrypt_file, decrypt_file_cancellable, encrypt_file, encrypt_file_cancellable,
};
pub use types::*;

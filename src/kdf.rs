//! Password-based key derivation.
//!
//! Keys are derived with PBKDF2 over the UTF-8 bytes of the password. The
//! derivation is deterministic: the same password, salt, iteration count and
//! length always give the same key, which is what lets a container be opened
//! again from the values stored in its header.
//!
//! Derived keys are returned as [`DerivedKey`] and wiped when dropped.

use hmac::Hmac;
use pbkdf2::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::registry::KdfAlg;
use crate::types::EncryptorError;

/// Key bytes, zeroized on drop.
pub type DerivedKey = Zeroizing<Vec<u8>>;

/// A configured derivation: algorithm, password, salt and iteration count.
pub struct KeyDerivation<'a> {
    alg: KdfAlg,
    password: &'a SecretString,
    salt: &'a [u8],
    iterations: u32,
}

impl<'a> KeyDerivation<'a> {
    /// Resolve `name` through the registry and bind the derivation inputs.
    pub fn new(
        name: &str,
        password: &'a SecretString,
        salt: &'a [u8],
        iterations: u32,
    ) -> Result<Self, EncryptorError> {
        Ok(Self::with_alg(KdfAlg::from_name(name)?, password, salt, iterations))
    }

    pub fn with_alg(
        alg: KdfAlg,
        password: &'a SecretString,
        salt: &'a [u8],
        iterations: u32,
    ) -> Self {
        Self {
            alg,
            password,
            salt,
            iterations,
        }
    }

    pub fn alg(&self) -> KdfAlg {
        self.alg
    }

    /// Derive `key_len` bytes.
    pub fn derive(&self, key_len: usize) -> Result<DerivedKey, EncryptorError> {
        derive_key(self.alg, self.password, self.salt, self.iterations, key_len)
    }
}

/// Derive `key_len` bytes from `password` and `salt`.
///
/// # Errors
///
/// Returns `EncryptorError::InvalidArgument` if `iterations` is zero, `salt`
/// is empty or `key_len` is zero.
pub fn derive_key(
    alg: KdfAlg,
    password: &SecretString,
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<DerivedKey, EncryptorError> {
    if iterations == 0 {
        return Err(EncryptorError::InvalidArgument(
            "kdf: iterations must be at least 1",
        ));
    }
    if salt.is_empty() {
        return Err(EncryptorError::InvalidArgument("kdf: salt must not be empty"));
    }
    if key_len == 0 {
        return Err(EncryptorError::InvalidArgument(
            "kdf: key length must be at least 1",
        ));
    }

    let pw = password.expose_secret().as_bytes();
    let mut out = Zeroizing::new(vec![0u8; key_len]);
    let res = match alg {
        KdfAlg::Pbkdf2Sha1 => pbkdf2::<Hmac<Sha1>>(pw, salt, iterations, out.as_mut_slice()),
        KdfAlg::Pbkdf2Sha256 => pbkdf2::<Hmac<Sha256>>(pw, salt, iterations, out.as_mut_slice()),
        KdfAlg::Pbkdf2Sha512 => pbkdf2::<Hmac<Sha512>>(pw, salt, iterations, out.as_mut_slice()),
    };
    res.map_err(|_| EncryptorError::InvalidArgument("kdf: invalid PBKDF2 parameters"))?;
    Ok(out)
}

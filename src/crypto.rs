//! Streaming block-cipher transforms and random salt/IV generation.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::{Padding, Pkcs7};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{Block, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use getrandom::fill as getrandom;
use zeroize::{Zeroize, Zeroizing};

use crate::registry::CipherAlg;
use crate::types::EncryptorError;

/// Incremental cipher transform.
///
/// `update` may emit fewer bytes than it was given; whatever is held back is
/// emitted by `finish`, which also applies or checks the padding.
pub trait Transform {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>);

    fn finish(self: Box<Self>, out: &mut Vec<u8>) -> Result<(), EncryptorError>;
}

/// Generate a cryptographically secure random salt of `len` bytes.
pub fn generate_salt(len: usize) -> Result<Vec<u8>, EncryptorError> {
    let mut salt = vec![0u8; len];
    getrandom(&mut salt).map_err(|_| EncryptorError::Entropy)?;
    Ok(salt)
}

/// Generate a fresh IV for `cipher`. Call once per encryption.
pub fn generate_iv(cipher: CipherAlg) -> Result<Vec<u8>, EncryptorError> {
    let mut iv = vec![0u8; cipher.block_len()];
    getrandom(&mut iv).map_err(|_| EncryptorError::Entropy)?;
    Ok(iv)
}

/// CBC encryption with PKCS#7 padding applied on `finish`.
pub struct CbcEncryptor<C: BlockEncryptMut> {
    cipher: C,
    pending: Zeroizing<Vec<u8>>,
}

impl<C: BlockEncryptMut> CbcEncryptor<C> {
    pub fn new(cipher: C) -> Self {
        Self {
            cipher,
            pending: Zeroizing::new(Vec::with_capacity(C::block_size())),
        }
    }
}

impl<C: BlockEncryptMut> Transform for CbcEncryptor<C> {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let bs = C::block_size();
        self.pending.extend_from_slice(input);
        let ready = self.pending.len() - self.pending.len() % bs;
        if ready == 0 {
            return;
        }
        let start = out.len();
        out.extend_from_slice(&self.pending[..ready]);
        for block in out[start..].chunks_exact_mut(bs) {
            self.cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.drain(..ready);
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> Result<(), EncryptorError> {
        let n = self.pending.len();
        let mut block = Block::<C>::default();
        block[..n].copy_from_slice(&self.pending);
        <Pkcs7 as Padding<C::BlockSize>>::pad(&mut block, n);
        self.cipher.encrypt_block_mut(&mut block);
        out.extend_from_slice(&block);
        Ok(())
    }
}

/// CBC decryption. The last full block is held back until `finish` so the
/// padding can be checked and stripped.
pub struct CbcDecryptor<C: BlockDecryptMut> {
    cipher: C,
    pending: Zeroizing<Vec<u8>>,
}

impl<C: BlockDecryptMut> CbcDecryptor<C> {
    pub fn new(cipher: C) -> Self {
        Self {
            cipher,
            pending: Zeroizing::new(Vec::with_capacity(C::block_size())),
        }
    }
}

impl<C: BlockDecryptMut> Transform for CbcDecryptor<C> {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let bs = C::block_size();
        self.pending.extend_from_slice(input);
        let len = self.pending.len();
        let keep = match len % bs {
            0 => bs.min(len),
            rem => rem,
        };
        let ready = len - keep;
        if ready == 0 {
            return;
        }
        let start = out.len();
        out.extend_from_slice(&self.pending[..ready]);
        for block in out[start..].chunks_exact_mut(bs) {
            self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.drain(..ready);
    }

    fn finish(mut self: Box<Self>, out: &mut Vec<u8>) -> Result<(), EncryptorError> {
        // Empty or not block-aligned: cannot carry a valid pad.
        if self.pending.len() != C::block_size() {
            return Err(EncryptorError::InvalidPadding);
        }
        let mut block = Block::<C>::clone_from_slice(&self.pending);
        self.cipher.decrypt_block_mut(&mut block);
        let res = match <Pkcs7 as Padding<C::BlockSize>>::unpad(&block) {
            Ok(plain) => {
                out.extend_from_slice(plain);
                Ok(())
            }
            Err(_) => Err(EncryptorError::InvalidPadding),
        };
        block.as_mut_slice().zeroize();
        res
    }
}

impl CipherAlg {
    /// Encrypting transform over `key` and `iv`.
    pub fn encryptor(
        &self,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Box<dyn Transform + Send>, EncryptorError> {
        self.check_lengths(key, iv)?;
        let bad = |_| EncryptorError::InvalidArgument("cipher: invalid key or IV length");
        let t: Box<dyn Transform + Send> = match self {
            CipherAlg::Aes128Cbc => Box::new(CbcEncryptor::new(
                cbc::Encryptor::<Aes128>::new_from_slices(key, iv).map_err(bad)?,
            )),
            CipherAlg::Aes192Cbc => Box::new(CbcEncryptor::new(
                cbc::Encryptor::<Aes192>::new_from_slices(key, iv).map_err(bad)?,
            )),
            CipherAlg::Aes256Cbc => Box::new(CbcEncryptor::new(
                cbc::Encryptor::<Aes256>::new_from_slices(key, iv).map_err(bad)?,
            )),
        };
        Ok(t)
    }

    /// Decrypting transform over `key` and the stored `iv`.
    pub fn decryptor(
        &self,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Box<dyn Transform + Send>, EncryptorError> {
        self.check_lengths(key, iv)?;
        let bad = |_| EncryptorError::InvalidArgument("cipher: invalid key or IV length");
        let t: Box<dyn Transform + Send> = match self {
            CipherAlg::Aes128Cbc => Box::new(CbcDecryptor::new(
                cbc::Decryptor::<Aes128>::new_from_slices(key, iv).map_err(bad)?,
            )),
            CipherAlg::Aes192Cbc => Box::new(CbcDecryptor::new(
                cbc::Decryptor::<Aes192>::new_from_slices(key, iv).map_err(bad)?,
            )),
            CipherAlg::Aes256Cbc => Box::new(CbcDecryptor::new(
                cbc::Decryptor::<Aes256>::new_from_slices(key, iv).map_err(bad)?,
            )),
        };
        Ok(t)
    }

    /// Fail unless `key_len` is this cipher's key length.
    pub fn check_key_len(&self, key_len: usize) -> Result<(), EncryptorError> {
        if key_len != self.key_len() {
            return Err(EncryptorError::InvalidKeyLength {
                cipher: self.name(),
                expected: self.key_len(),
                actual: key_len,
            });
        }
        Ok(())
    }

    fn check_lengths(&self, key: &[u8], iv: &[u8]) -> Result<(), EncryptorError> {
        self.check_key_len(key.len())?;
        if iv.len() != self.block_len() {
            return Err(EncryptorError::InvalidArgument(
                "cipher: IV length must equal the block length",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x24; 16];

    fn run(mut t: Box<dyn Transform + Send>, parts: &[&[u8]]) -> Result<Vec<u8>, EncryptorError> {
        let mut out = Vec::new();
        for p in parts {
            t.update(p, &mut out);
        }
        t.finish(&mut out)?;
        Ok(out)
    }

    fn encrypt(data: &[u8]) -> Vec<u8> {
        run(CipherAlg::Aes256Cbc.encryptor(&KEY, &IV).unwrap(), &[data]).unwrap()
    }

    #[test]
    fn nist_sp800_38a_cbc_aes256_first_block() {
        let key =
            hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
                .unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ct = run(CipherAlg::Aes256Cbc.encryptor(&key, &iv).unwrap(), &[&pt[..]]).unwrap();
        assert_eq!(ct.len(), 32, "one data block plus one full padding block");
        assert_eq!(hex::encode(&ct[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
    }

    #[test]
    fn padding_always_extends_to_next_block() {
        for (len, expected) in [(0, 16), (1, 16), (15, 16), (16, 32), (17, 32)] {
            assert_eq!(encrypt(&vec![0xAA; len]).len(), expected, "len {len}");
        }
    }

    #[test]
    fn chunking_does_not_change_output() {
        let data: Vec<u8> = (0..100u8).collect();
        let whole = encrypt(&data);
        let split = run(
            CipherAlg::Aes256Cbc.encryptor(&KEY, &IV).unwrap(),
            &[&data[..3], &data[3..40], &data[40..40], &data[40..]],
        )
        .unwrap();
        assert_eq!(whole, split);

        let back = run(
            CipherAlg::Aes256Cbc.decryptor(&KEY, &IV).unwrap(),
            &[&whole[..5], &whole[5..16], &whole[16..33], &whole[33..]],
        )
        .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn every_key_size_round_trips() {
        for alg in CipherAlg::ALL {
            let key = vec![7u8; alg.key_len()];
            let ct = run(alg.encryptor(&key, &IV).unwrap(), &[&b"hello world"[..]]).unwrap();
            let pt = run(alg.decryptor(&key, &IV).unwrap(), &[&ct[..]]).unwrap();
            assert_eq!(pt, b"hello world");
        }
    }

    #[test]
    fn truncated_or_empty_ciphertext_is_invalid_padding() {
        let ct = encrypt(b"some plaintext here");
        for cut in [&ct[..0], &ct[..ct.len() - 1], &ct[..5]] {
            let res = run(CipherAlg::Aes256Cbc.decryptor(&KEY, &IV).unwrap(), &[cut]);
            assert!(matches!(res, Err(EncryptorError::InvalidPadding)));
        }
    }

    #[test]
    fn corrupted_last_block_is_invalid_padding() {
        // Pad of a 16-byte plaintext is a full block of 0x10; the previous
        // ciphertext block xors straight into it.
        let mut ct = encrypt(&[0u8; 16]);
        ct[15] ^= 0x10;
        let res = run(CipherAlg::Aes256Cbc.decryptor(&KEY, &IV).unwrap(), &[&ct[..]]);
        assert!(matches!(res, Err(EncryptorError::InvalidPadding)));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let res = CipherAlg::Aes256Cbc.encryptor(&[0u8; 16], &IV);
        assert!(matches!(
            res,
            Err(EncryptorError::InvalidKeyLength {
                expected: 32,
                actual: 16,
                ..
            })
        ));
        assert!(matches!(
            CipherAlg::Aes128Cbc.decryptor(&[0u8; 16], &[0u8; 8]),
            Err(EncryptorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn random_values_have_requested_length_and_differ() {
        let a = generate_iv(CipherAlg::Aes256Cbc).unwrap();
        let b = generate_iv(CipherAlg::Aes256Cbc).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert_eq!(generate_salt(24).unwrap().len(), 24);
    }
}

//! Per-object crypt filters: the transformation applied to string and stream
//! payloads under a derived object key.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::pkcs5::Pkcs5;
use super::rc4;
use crate::error::DecryptionError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub trait CryptFilter: Send + Sync {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
}

/// No transformation; the `/Identity` crypt filter.
pub struct IdentityCryptFilter;

impl CryptFilter for IdentityCryptFilter {
    fn encrypt(&self, _key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(ciphertext.to_vec())
    }
}

/// RC4 under the per-object key; revisions 2 and 3.
pub struct Rc4CryptFilter;

impl CryptFilter for Rc4CryptFilter {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if key.is_empty() {
            return Err(DecryptionError::KeyLength);
        }
        Ok(rc4::apply(key, plaintext))
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        self.encrypt(key, ciphertext)
    }
}

fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// AES-128-CBC with a random IV prefix and PKCS#5 padding; revision 4.
pub struct Aes128CryptFilter;

impl CryptFilter for Aes128CryptFilter {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let iv = random_iv();
        let cipher = Aes128CbcEnc::new_from_slices(key, &iv).map_err(|_| DecryptionError::KeyLength)?;
        let mut out = iv.to_vec();
        out.extend(cipher.encrypt_padded_vec_mut::<Pkcs5>(plaintext));
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let (iv, body) = split_iv(ciphertext)?;
        if body.is_empty() {
            return Ok(vec![]);
        }
        let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| DecryptionError::KeyLength)?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs5>(body)
            .map_err(|_| DecryptionError::Padding)
    }
}

/// AES-256-CBC with a random IV prefix and PKCS#5 padding; revision 6.
pub struct Aes256CryptFilter;

impl CryptFilter for Aes256CryptFilter {
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let iv = random_iv();
        let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| DecryptionError::KeyLength)?;
        let mut out = iv.to_vec();
        out.extend(cipher.encrypt_padded_vec_mut::<Pkcs5>(plaintext));
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let (iv, body) = split_iv(ciphertext)?;
        if body.is_empty() {
            return Ok(vec![]);
        }
        let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| DecryptionError::KeyLength)?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs5>(body)
            .map_err(|_| DecryptionError::Padding)
    }
}

fn split_iv(ciphertext: &[u8]) -> Result<(&[u8], &[u8]), DecryptionError> {
    if ciphertext.len() < 16 {
        return Err(DecryptionError::BlockLength);
    }
    Ok(ciphertext.split_at(16))
}

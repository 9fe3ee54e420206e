//! Standard security handler: key derivation, password verification and
//! per-object encryption for the four supported variants (RC4 with 40- or
//! 128-bit keys, AES-128 and AES-256).
//!
//! After loading, documents are held decrypted in memory; the state produced
//! here carries everything needed to re-encrypt on save, including the
//! `/Encrypt` dictionary to emit.

pub mod crypt_filters;
mod pkcs5;
pub mod rc4;

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, KeyInit};
use log::warn;
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::{Sha256, Sha384, Sha512};

use crate::error::DecryptionError;
use crate::object::{Dictionary, Object, ObjectId, StringFormat};
use crate::{Document, Error, Result};
use crypt_filters::{Aes128CryptFilter, Aes256CryptFilter, CryptFilter, Rc4CryptFilter};

/// Padding string prepended to short passwords, ISO 32000-1 table 21.
const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Reserved bits of `/P` that must read as one.
const PERMISSION_RESERVED_ONES: u32 = 0xFFFF_F0C0;

bitflags::bitflags! {
    /// User access permissions from the `/P` entry.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_FOR_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

impl Permissions {
    pub fn as_p_value(self) -> i32 {
        (self.bits() | PERMISSION_RESERVED_ONES) as i32
    }

    pub fn from_p_value(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }
}

/// The four supported (algorithm, key length, revision) triples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionVariant {
    Rc4With40BitKey,
    Rc4With128BitKey,
    Aes128,
    Aes256,
}

impl EncryptionVariant {
    pub fn v(self) -> i64 {
        match self {
            Self::Rc4With40BitKey => 1,
            Self::Rc4With128BitKey => 2,
            Self::Aes128 => 4,
            Self::Aes256 => 5,
        }
    }

    pub fn revision(self) -> i64 {
        match self {
            Self::Rc4With40BitKey => 2,
            Self::Rc4With128BitKey => 3,
            Self::Aes128 => 4,
            Self::Aes256 => 6,
        }
    }

    /// File key length in bytes.
    pub fn key_bytes(self) -> usize {
        match self {
            Self::Rc4With40BitKey => 5,
            Self::Rc4With128BitKey | Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }

    fn crypt_filter(self) -> &'static dyn CryptFilter {
        match self {
            Self::Rc4With40BitKey | Self::Rc4With128BitKey => &Rc4CryptFilter,
            Self::Aes128 => &Aes128CryptFilter,
            Self::Aes256 => &Aes256CryptFilter,
        }
    }
}

/// Parameters for encrypting a document.
#[derive(Clone, Debug)]
pub struct EncryptionSettings<'a> {
    pub variant: EncryptionVariant,
    pub user_password: &'a [u8],
    pub owner_password: &'a [u8],
    pub permissions: Permissions,
}

/// Everything needed to decrypt loaded payloads and to re-encrypt on save.
#[derive(Clone, Debug)]
pub struct EncryptionState {
    pub variant: EncryptionVariant,
    pub file_key: Vec<u8>,
    pub permissions: Permissions,
    pub owner_authenticated: bool,
    pub encrypt_metadata: bool,
    /// The `/Encrypt` dictionary as it will be written back.
    pub dictionary: Dictionary,
    user_password: Option<Vec<u8>>,
    owner_password: Option<Vec<u8>>,
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let used = password.len().min(32);
    padded[..used].copy_from_slice(&password[..used]);
    padded[used..].copy_from_slice(&PAD[..32 - used]);
    padded
}

/// SASLprep for revision 6 passwords, truncated to 127 UTF-8 bytes.
fn normalize_password(password: &[u8]) -> Vec<u8> {
    let normalized = match std::str::from_utf8(password) {
        Ok(text) => match stringprep::saslprep(text) {
            Ok(prepped) => prepped.into_owned().into_bytes(),
            Err(_) => {
                warn!("password failed SASLprep normalization, using it verbatim");
                password.to_vec()
            }
        },
        Err(_) => password.to_vec(),
    };
    normalized.into_iter().take(127).collect()
}

fn file_id_bytes(document: &Document) -> Vec<u8> {
    document
        .trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|id| id.first())
        .and_then(|first| first.as_str().ok())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

/// Algorithm 2: the RC4/AES-128 file encryption key.
fn compute_file_key_legacy(
    variant: EncryptionVariant, password: &[u8], owner_hash: &[u8], p: i32, file_id: &[u8],
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(owner_hash);
    hasher.update(p.to_le_bytes());
    hasher.update(file_id);
    if variant.revision() >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut key = hasher.finalize().to_vec();
    let n = variant.key_bytes();
    if variant.revision() >= 3 {
        for _ in 0..50 {
            key = Md5::digest(&key[..n]).to_vec();
        }
    }
    key.truncate(n);
    key
}

/// Algorithm 3: the `/O` entry.
fn compute_owner_hash(variant: EncryptionVariant, owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
    let source = if owner_password.is_empty() { user_password } else { owner_password };
    let mut key = Md5::digest(pad_password(source)).to_vec();
    if variant.revision() >= 3 {
        for _ in 0..50 {
            key = Md5::digest(&key).to_vec();
        }
    }
    let n = variant.key_bytes();
    let rc4_key = &key[..n];

    let mut hash = rc4::apply(rc4_key, &pad_password(user_password));
    if variant.revision() >= 3 {
        for i in 1u8..=19 {
            let step_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
            hash = rc4::apply(&step_key, &hash);
        }
    }
    hash
}

/// Algorithms 4 and 5: the `/U` entry.
fn compute_user_hash(variant: EncryptionVariant, file_key: &[u8], file_id: &[u8]) -> Vec<u8> {
    if variant.revision() == 2 {
        return rc4::apply(file_key, &PAD);
    }
    let mut hasher = Md5::new();
    hasher.update(PAD);
    hasher.update(file_id);
    let mut hash = rc4::apply(file_key, &hasher.finalize());
    for i in 1u8..=19 {
        let step_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        hash = rc4::apply(&step_key, &hash);
    }
    hash.resize(32, 0);
    hash
}

/// Algorithm 2.B: the revision 6 hardened hash.
fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(udata);
    let mut key: Vec<u8> = hasher.finalize().to_vec();

    let mut round = 0usize;
    loop {
        let mut block = Vec::with_capacity(64 * (password.len() + key.len() + udata.len()));
        for _ in 0..64 {
            block.extend_from_slice(password);
            block.extend_from_slice(&key);
            block.extend_from_slice(udata);
        }
        let encrypted = aes128_cbc_encrypt_nopad(&key[..16], &key[16..32], &block);
        let modulo = encrypted[..16].iter().map(|b| *b as u32).sum::<u32>() % 3;
        key = match modulo {
            0 => Sha256::digest(&encrypted).to_vec(),
            1 => Sha384::digest(&encrypted).to_vec(),
            _ => Sha512::digest(&encrypted).to_vec(),
        };
        round += 1;
        if round >= 64 && (*encrypted.last().expect("block is never empty") as usize) <= round - 32 {
            break;
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&key[..32]);
    out
}

fn aes128_cbc_encrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
        .expect("key and iv sizes are fixed")
        .encrypt_padded_vec_mut::<NoPadding>(data)
}

fn aes256_cbc_nopad(key: &[u8], iv: &[u8; 16], data: &[u8], encrypt: bool) -> Result<Vec<u8>> {
    if encrypt {
        Ok(cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(|_| DecryptionError::KeyLength)?
            .encrypt_padded_vec_mut::<NoPadding>(data))
    } else {
        cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(|_| Error::from(DecryptionError::KeyLength))?
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(|_| DecryptionError::BlockLength.into())
    }
}

impl EncryptionState {
    /// Build the state for an encrypted document by authenticating
    /// `password` first as the user and then as the owner password.
    pub fn decode(document: &Document, password: &[u8]) -> Result<EncryptionState> {
        let encrypt = document.get_encrypt_dict()?;
        let filter = encrypt.get(b"Filter").and_then(Object::as_name).unwrap_or(b"");
        if filter != b"Standard" {
            return Err(DecryptionError::Unsupported { v: -1, r: -1 }.into());
        }

        let v = encrypt.get(b"V").and_then(Object::as_i64).unwrap_or(0);
        let r = encrypt
            .get(b"R")
            .and_then(Object::as_i64)
            .map_err(|_| DecryptionError::MissingRevision)?;
        let length_bits = encrypt.get(b"Length").and_then(Object::as_i64).unwrap_or(40);

        let variant = match (v, r) {
            (1, 2) => EncryptionVariant::Rc4With40BitKey,
            (2, 3) if length_bits == 40 => EncryptionVariant::Rc4With40BitKey,
            (2, 3) => EncryptionVariant::Rc4With128BitKey,
            (4, 4) => match crypt_filter_method(encrypt)? {
                b"AESV2" => EncryptionVariant::Aes128,
                b"V2" => EncryptionVariant::Rc4With128BitKey,
                _ => return Err(DecryptionError::Unsupported { v, r }.into()),
            },
            (5, 6) => EncryptionVariant::Aes256,
            _ => return Err(DecryptionError::Unsupported { v, r }.into()),
        };

        let owner_hash = encrypt
            .get(b"O")
            .and_then(Object::as_str)
            .map_err(|_| DecryptionError::MissingOwnerPassword)?
            .to_vec();
        let user_hash = encrypt
            .get(b"U")
            .and_then(Object::as_str)
            .map_err(|_| DecryptionError::MissingUserPassword)?
            .to_vec();
        let p = encrypt
            .get(b"P")
            .and_then(Object::as_i64)
            .map_err(|_| DecryptionError::MissingPermissions)? as i32;
        let encrypt_metadata = encrypt
            .get(b"EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);
        let permissions = Permissions::from_p_value(p);
        let dictionary = encrypt.clone();

        if variant == EncryptionVariant::Aes256 {
            return Self::decode_r6(
                document, password, owner_hash, user_hash, permissions, encrypt_metadata, dictionary,
            );
        }

        if owner_hash.len() < 32 || user_hash.len() < 32 {
            return Err(DecryptionError::MissingOwnerPassword.into());
        }
        let file_id = file_id_bytes(document);
        if file_id.is_empty() {
            warn!("encrypted document has no file identifier, deriving keys from an empty one");
        }

        // Try the password as the user password.
        let candidate =
            compute_file_key_legacy(variant, password, &owner_hash, p, &file_id, encrypt_metadata);
        let expected = compute_user_hash(variant, &candidate, &file_id);
        let matches = if variant.revision() == 2 {
            expected == user_hash
        } else {
            expected[..16] == user_hash[..16]
        };
        if matches {
            return Ok(EncryptionState {
                variant,
                file_key: candidate,
                permissions,
                owner_authenticated: false,
                encrypt_metadata,
                dictionary,
                user_password: Some(password.to_vec()),
                owner_password: None,
            });
        }

        // Try it as the owner password: recover the user password from /O.
        let mut key = Md5::digest(pad_password(password)).to_vec();
        if variant.revision() >= 3 {
            for _ in 0..50 {
                key = Md5::digest(&key).to_vec();
            }
        }
        let rc4_key = &key[..variant.key_bytes()];
        let mut recovered = owner_hash.clone();
        if variant.revision() == 2 {
            recovered = rc4::apply(rc4_key, &recovered);
        } else {
            for i in (1u8..=19).rev() {
                let step_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
                recovered = rc4::apply(&step_key, &recovered);
            }
            recovered = rc4::apply(rc4_key, &recovered);
        }
        let candidate =
            compute_file_key_legacy(variant, &recovered, &owner_hash, p, &file_id, encrypt_metadata);
        let expected = compute_user_hash(variant, &candidate, &file_id);
        let matches = if variant.revision() == 2 {
            expected == user_hash
        } else {
            expected[..16] == user_hash[..16]
        };
        if matches {
            return Ok(EncryptionState {
                variant,
                file_key: candidate,
                permissions,
                owner_authenticated: true,
                encrypt_metadata,
                dictionary,
                user_password: Some(recovered),
                owner_password: Some(password.to_vec()),
            });
        }

        Err(Error::InvalidPassword)
    }

    fn decode_r6(
        document: &Document, password: &[u8], owner_hash: Vec<u8>, user_hash: Vec<u8>,
        permissions: Permissions, encrypt_metadata: bool, dictionary: Dictionary,
    ) -> Result<EncryptionState> {
        if owner_hash.len() < 48 || user_hash.len() < 48 {
            return Err(DecryptionError::MissingOwnerPassword.into());
        }
        let encrypt = document.get_encrypt_dict()?;
        let ue = encrypt
            .get(b"UE")
            .and_then(Object::as_str)
            .map_err(|_| DecryptionError::MissingUserPassword)?;
        let oe = encrypt
            .get(b"OE")
            .and_then(Object::as_str)
            .map_err(|_| DecryptionError::MissingOwnerPassword)?;

        let password = normalize_password(password);
        let (validation_salt, key_salt) = (&user_hash[32..40], &user_hash[40..48]);

        // User password first.
        if hash_r6(&password, validation_salt, &[])[..] == user_hash[..32] {
            let intermediate = hash_r6(&password, key_salt, &[]);
            let file_key = aes256_cbc_nopad(&intermediate, &[0u8; 16], ue, false)?;
            Self::verify_perms(encrypt, &file_key)?;
            return Ok(EncryptionState {
                variant: EncryptionVariant::Aes256,
                file_key,
                permissions,
                owner_authenticated: false,
                encrypt_metadata,
                dictionary,
                user_password: Some(password),
                owner_password: None,
            });
        }

        // Owner password hashes over the full /U value.
        let udata = &user_hash[..48];
        let (validation_salt, key_salt) = (&owner_hash[32..40], &owner_hash[40..48]);
        if hash_r6(&password, validation_salt, udata)[..] == owner_hash[..32] {
            let intermediate = hash_r6(&password, key_salt, udata);
            let file_key = aes256_cbc_nopad(&intermediate, &[0u8; 16], oe, false)?;
            Self::verify_perms(encrypt, &file_key)?;
            return Ok(EncryptionState {
                variant: EncryptionVariant::Aes256,
                file_key,
                permissions,
                owner_authenticated: true,
                encrypt_metadata,
                dictionary,
                user_password: None,
                owner_password: Some(password),
            });
        }

        Err(Error::InvalidPassword)
    }

    fn verify_perms(encrypt: &Dictionary, file_key: &[u8]) -> Result<()> {
        let Ok(perms) = encrypt.get(b"Perms").and_then(Object::as_str) else {
            warn!("revision 6 encryption without a Perms entry");
            return Ok(());
        };
        if perms.len() != 16 {
            return Err(DecryptionError::MissingPermissions.into());
        }
        let decrypted = ecb::Decryptor::<aes::Aes256>::new_from_slice(file_key)
            .map_err(|_| Error::from(DecryptionError::KeyLength))?
            .decrypt_padded_vec_mut::<NoPadding>(perms)
            .map_err(|_| Error::from(DecryptionError::BlockLength))?;
        if &decrypted[9..12] != b"adb" {
            return Err(DecryptionError::MissingPermissions.into());
        }
        Ok(())
    }

    /// Build fresh state (and the dictionary to write) from settings.
    pub fn from_settings(settings: &EncryptionSettings, file_id: &[u8]) -> Result<EncryptionState> {
        let variant = settings.variant;
        let p = settings.permissions.as_p_value();

        if variant == EncryptionVariant::Aes256 {
            return Self::from_settings_r6(settings);
        }

        let owner_hash = compute_owner_hash(variant, settings.owner_password, settings.user_password);
        let file_key = compute_file_key_legacy(variant, settings.user_password, &owner_hash, p, file_id, true);
        let user_hash = compute_user_hash(variant, &file_key, file_id);

        let mut dictionary = Dictionary::new();
        dictionary.set("Filter", Object::name("Standard"));
        dictionary.set("V", variant.v());
        dictionary.set("R", variant.revision());
        dictionary.set("Length", (variant.key_bytes() * 8) as i64);
        if variant == EncryptionVariant::Aes128 {
            let mut std_cf = Dictionary::new();
            std_cf.set("CFM", Object::name("AESV2"));
            std_cf.set("AuthEvent", Object::name("DocOpen"));
            std_cf.set("Length", 16);
            let mut cf = Dictionary::new();
            cf.set("StdCF", std_cf);
            dictionary.set("CF", cf);
            dictionary.set("StmF", Object::name("StdCF"));
            dictionary.set("StrF", Object::name("StdCF"));
        }
        dictionary.set("O", Object::String(owner_hash, StringFormat::Hexadecimal));
        dictionary.set("U", Object::String(user_hash, StringFormat::Hexadecimal));
        dictionary.set("P", p as i64);

        Ok(EncryptionState {
            variant,
            file_key,
            permissions: settings.permissions,
            owner_authenticated: true,
            encrypt_metadata: true,
            dictionary,
            user_password: Some(settings.user_password.to_vec()),
            owner_password: Some(settings.owner_password.to_vec()),
        })
    }

    fn from_settings_r6(settings: &EncryptionSettings) -> Result<EncryptionState> {
        let user_password = normalize_password(settings.user_password);
        let owner_password = normalize_password(settings.owner_password);

        let mut file_key = vec![0u8; 32];
        rand::rng().fill_bytes(&mut file_key);

        let mut state = EncryptionState {
            variant: EncryptionVariant::Aes256,
            file_key,
            permissions: settings.permissions,
            owner_authenticated: true,
            encrypt_metadata: true,
            dictionary: Dictionary::new(),
            user_password: Some(user_password),
            owner_password: Some(owner_password),
        };
        state.rebuild_r6_dictionary()?;
        Ok(state)
    }

    /// Recompute `/U`, `/UE`, `/O`, `/OE` and `/Perms` around the current
    /// file key and passwords.
    fn rebuild_r6_dictionary(&mut self) -> Result<()> {
        let user_password = self.user_password.clone().unwrap_or_default();
        let owner_password = self.owner_password.clone().unwrap_or_default();

        let mut salts = [0u8; 16];
        rand::rng().fill_bytes(&mut salts);
        let (validation_salt, key_salt) = salts.split_at(8);

        let mut user_entry = hash_r6(&user_password, validation_salt, &[]).to_vec();
        user_entry.extend_from_slice(validation_salt);
        user_entry.extend_from_slice(key_salt);
        let intermediate = hash_r6(&user_password, key_salt, &[]);
        let ue = aes256_cbc_nopad(&intermediate, &[0u8; 16], &self.file_key, true)?;

        let mut salts = [0u8; 16];
        rand::rng().fill_bytes(&mut salts);
        let (validation_salt, key_salt) = salts.split_at(8);
        let mut owner_entry = hash_r6(&owner_password, validation_salt, &user_entry).to_vec();
        owner_entry.extend_from_slice(validation_salt);
        owner_entry.extend_from_slice(key_salt);
        let intermediate = hash_r6(&owner_password, key_salt, &user_entry);
        let oe = aes256_cbc_nopad(&intermediate, &[0u8; 16], &self.file_key, true)?;

        let mut perms_block = [0u8; 16];
        perms_block[..4].copy_from_slice(&self.permissions.as_p_value().to_le_bytes());
        perms_block[4..8].copy_from_slice(&[0xFF; 4]);
        perms_block[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        perms_block[9..12].copy_from_slice(b"adb");
        rand::rng().fill_bytes(&mut perms_block[12..]);
        let perms = ecb::Encryptor::<aes::Aes256>::new_from_slice(&self.file_key)
            .map_err(|_| Error::from(DecryptionError::KeyLength))?
            .encrypt_padded_vec_mut::<NoPadding>(&perms_block);

        let mut std_cf = Dictionary::new();
        std_cf.set("CFM", Object::name("AESV3"));
        std_cf.set("AuthEvent", Object::name("DocOpen"));
        std_cf.set("Length", 32);
        let mut cf = Dictionary::new();
        cf.set("StdCF", std_cf);

        let mut dictionary = Dictionary::new();
        dictionary.set("Filter", Object::name("Standard"));
        dictionary.set("V", 5);
        dictionary.set("R", 6);
        dictionary.set("Length", 256);
        dictionary.set("CF", cf);
        dictionary.set("StmF", Object::name("StdCF"));
        dictionary.set("StrF", Object::name("StdCF"));
        dictionary.set("O", Object::String(owner_entry, StringFormat::Hexadecimal));
        dictionary.set("OE", Object::String(oe, StringFormat::Hexadecimal));
        dictionary.set("U", Object::String(user_entry, StringFormat::Hexadecimal));
        dictionary.set("UE", Object::String(ue, StringFormat::Hexadecimal));
        dictionary.set("P", self.permissions.as_p_value() as i64);
        dictionary.set("Perms", Object::String(perms, StringFormat::Hexadecimal));
        self.dictionary = dictionary;
        Ok(())
    }

    /// Replace the user password, re-deriving every affected entry. The file
    /// contents themselves are re-encrypted when the document is next saved.
    pub fn change_user_password(&mut self, new_password: &[u8], file_id: &[u8]) -> Result<()> {
        if !self.owner_authenticated {
            return Err(Error::PermissionDenied("change user password"));
        }
        match self.variant {
            EncryptionVariant::Aes256 => {
                self.user_password = Some(normalize_password(new_password));
                self.rebuild_r6_dictionary()
            }
            _ => {
                let owner_password = self
                    .owner_password
                    .clone()
                    .ok_or(Error::PermissionDenied("change user password"))?;
                self.rebuild_legacy(new_password.to_vec(), owner_password, file_id)
            }
        }
    }

    /// Replace the owner password, keeping the user password.
    pub fn change_owner_password(&mut self, new_password: &[u8], file_id: &[u8]) -> Result<()> {
        if !self.owner_authenticated {
            return Err(Error::PermissionDenied("change owner password"));
        }
        match self.variant {
            EncryptionVariant::Aes256 => {
                self.owner_password = Some(normalize_password(new_password));
                self.rebuild_r6_dictionary()
            }
            _ => {
                let user_password = self
                    .user_password
                    .clone()
                    .ok_or(Error::PermissionDenied("change owner password"))?;
                self.rebuild_legacy(user_password, new_password.to_vec(), file_id)
            }
        }
    }

    fn rebuild_legacy(&mut self, user_password: Vec<u8>, owner_password: Vec<u8>, file_id: &[u8]) -> Result<()> {
        let settings = EncryptionSettings {
            variant: self.variant,
            user_password: &user_password,
            owner_password: &owner_password,
            permissions: self.permissions,
        };
        let rebuilt = Self::from_settings(&settings, file_id)?;
        self.file_key = rebuilt.file_key;
        self.dictionary = rebuilt.dictionary;
        self.user_password = Some(user_password);
        self.owner_password = Some(owner_password);
        Ok(())
    }

    /// Is `operation` allowed under the authenticated tier?
    pub fn is_permitted(&self, operation: Permissions) -> bool {
        self.owner_authenticated || self.permissions.contains(operation)
    }

    /// The key used for object `id`.
    pub fn object_key(&self, id: ObjectId) -> Vec<u8> {
        match self.variant {
            EncryptionVariant::Aes256 => self.file_key.clone(),
            variant => {
                let mut hasher = Md5::new();
                hasher.update(&self.file_key);
                hasher.update(&id.0.to_le_bytes()[..3]);
                hasher.update(&id.1.to_le_bytes()[..2]);
                if variant == EncryptionVariant::Aes128 {
                    hasher.update(b"sAlT");
                }
                let mut key = hasher.finalize().to_vec();
                key.truncate((self.file_key.len() + 5).min(16));
                key
            }
        }
    }
}

fn crypt_filter_method(encrypt: &Dictionary) -> Result<&[u8]> {
    encrypt
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|cf| cf.get(b"StdCF"))
        .and_then(Object::as_dict)
        .and_then(|std_cf| std_cf.get(b"CFM"))
        .and_then(Object::as_name)
}

/// Should this object's payload be left alone by the crypt filter?
fn exempt_stream(state: &EncryptionState, stream_dict: &Dictionary) -> bool {
    if stream_dict.has_type(b"XRef") {
        return true;
    }
    !state.encrypt_metadata && stream_dict.has_type(b"Metadata")
}

fn transform(state: &EncryptionState, id: ObjectId, object: &mut Object, encrypt: bool) -> Result<()> {
    let filter = state.variant.crypt_filter();
    let key = state.object_key(id);
    walk(filter, &key, state, object, encrypt)
}

fn walk(
    filter: &dyn CryptFilter, key: &[u8], state: &EncryptionState, object: &mut Object, encrypt: bool,
) -> Result<()> {
    match object {
        Object::String(bytes, _) => {
            *bytes = if encrypt {
                filter.encrypt(key, bytes)?
            } else {
                filter.decrypt(key, bytes)?
            };
        }
        Object::Array(items) => {
            for item in items {
                walk(filter, key, state, item, encrypt)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                walk(filter, key, state, value, encrypt)?;
            }
        }
        Object::Stream(stream) => {
            if !exempt_stream(state, &stream.dict) {
                let content = if encrypt {
                    filter.encrypt(key, &stream.content)?
                } else {
                    filter.decrypt(key, &stream.content)?
                };
                stream.set_content(content);
            }
            for (_, value) in stream.dict.iter_mut() {
                walk(filter, key, state, value, encrypt)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Decrypt the strings and stream payloads of a freshly parsed object.
pub fn decrypt_object(state: &EncryptionState, id: ObjectId, object: &mut Object) -> Result<()> {
    transform(state, id, object, false)
}

/// Encrypt an object about to be written under its own id.
pub fn encrypt_object(state: &EncryptionState, id: ObjectId, object: &mut Object) -> Result<()> {
    transform(state, id, object, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(variant: EncryptionVariant) {
        let settings = EncryptionSettings {
            variant,
            user_password: b"user",
            owner_password: b"owner",
            permissions: Permissions::default(),
        };
        let state = EncryptionState::from_settings(&settings, b"0123456789abcdef").unwrap();

        let mut object = Object::Array(vec![
            Object::string_literal("secret"),
            Object::Integer(5),
            Object::name("Untouched"),
        ]);
        let original = object.clone();
        encrypt_object(&state, (12, 0), &mut object).unwrap();
        assert_ne!(object.as_array().unwrap()[0], original.as_array().unwrap()[0]);
        assert_eq!(object.as_array().unwrap()[1], Object::Integer(5));
        decrypt_object(&state, (12, 0), &mut object).unwrap();
        assert_eq!(object, original);
    }

    #[test]
    fn object_round_trip_all_variants() {
        round_trip(EncryptionVariant::Rc4With40BitKey);
        round_trip(EncryptionVariant::Rc4With128BitKey);
        round_trip(EncryptionVariant::Aes128);
        round_trip(EncryptionVariant::Aes256);
    }

    #[test]
    fn object_keys_differ_per_object() {
        let settings = EncryptionSettings {
            variant: EncryptionVariant::Rc4With128BitKey,
            user_password: b"",
            owner_password: b"o",
            permissions: Permissions::default(),
        };
        let state = EncryptionState::from_settings(&settings, b"id-bytes").unwrap();
        assert_ne!(state.object_key((1, 0)), state.object_key((2, 0)));
        assert_ne!(state.object_key((1, 0)), state.object_key((1, 1)));
    }

    #[test]
    fn aes256_uses_the_file_key_directly() {
        let settings = EncryptionSettings {
            variant: EncryptionVariant::Aes256,
            user_password: b"u",
            owner_password: b"o",
            permissions: Permissions::default(),
        };
        let state = EncryptionState::from_settings(&settings, b"").unwrap();
        assert_eq!(state.object_key((9, 0)), state.file_key);
    }

    #[test]
    fn p_value_keeps_reserved_bits() {
        let p = Permissions::PRINT.as_p_value();
        assert!(p < 0, "high reserved bits force a negative P");
        assert!(Permissions::from_p_value(p).contains(Permissions::PRINT));
        assert!(!Permissions::from_p_value(p).contains(Permissions::MODIFY));
    }

    #[test]
    fn permission_check_honours_tiers() {
        let settings = EncryptionSettings {
            variant: EncryptionVariant::Aes128,
            user_password: b"u",
            owner_password: b"o",
            permissions: Permissions::PRINT,
        };
        let mut state = EncryptionState::from_settings(&settings, b"id").unwrap();
        assert!(state.is_permitted(Permissions::MODIFY));
        state.owner_authenticated = false;
        assert!(state.is_permitted(Permissions::PRINT));
        assert!(!state.is_permitted(Permissions::MODIFY));
    }

    #[test]
    fn hardened_hash_is_deterministic_and_salted() {
        let a = hash_r6(b"password", b"salt8byt", &[]);
        let b = hash_r6(b"password", b"salt8byt", &[]);
        let c = hash_r6(b"password", b"other8by", &[]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

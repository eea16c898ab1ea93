//! Key derivation for the standard security handler, revisions 2 to 4.

use super::rc4::rc4_crypt;
use md5::{Digest, Md5};

/// Password padding string (Algorithm 2, step a).
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub(crate) fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// The `/O` value (Algorithm 3).
pub(crate) fn owner_key(owner: &[u8], user: &[u8], revision: u32, key_len: usize) -> Vec<u8> {
    let password = if owner.is_empty() { user } else { owner };
    let mut hash = Md5::digest(pad_password(password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    let rc4_key = &hash[..key_len];

    let mut result = rc4_crypt(rc4_key, &pad_password(user));
    if revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
            result = rc4_crypt(&round_key, &result);
        }
    }
    result
}

/// The file encryption key (Algorithm 2). Metadata is always encrypted.
pub(crate) fn file_key(
    user: &[u8],
    owner_key: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_len: usize,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(user));
    hasher.update(owner_key);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_len]).to_vec();
        }
    }
    hash.truncate(key_len);
    hash
}

/// The `/U` value (Algorithm 4 for R2, Algorithm 5 otherwise).
pub(crate) fn user_key(file_key: &[u8], file_id: &[u8], revision: u32) -> Vec<u8> {
    if revision < 3 {
        return rc4_crypt(file_key, &PADDING);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();
    for i in 0..20u8 {
        let round_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        hash = rc4_crypt(&round_key, &hash);
    }
    // Arbitrary padding up to 32 bytes.
    hash.resize(32, 0);
    hash
}

/// Per-object key (Algorithm 1).
pub(crate) fn object_key(file_key: &[u8], id: (u32, u16), aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&id.0.to_le_bytes()[..3]);
    hasher.update(id.1.to_le_bytes());
    if aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

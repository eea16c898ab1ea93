//! AES-128-CBC as used by the AESV2 crypt filter: a random 16-byte IV is
//! prepended to the ciphertext and the plaintext carries PKCS#7 padding.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use aes::Aes128;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub(crate) fn aes128_encrypt(key: &[u8], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, String> {
    let cipher = Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|_| format!("AES-128 key must be 16 bytes, got {}", key.len()))?;

    let mut out = Vec::with_capacity(16 + data.len() + 16);
    out.extend_from_slice(iv);
    out.extend_from_slice(&cipher.encrypt_padded_vec_mut::<Pkcs7>(data));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockDecryptMut;

    type Aes128CbcDec = cbc::Decryptor<Aes128>;

    fn decrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
        let (iv, body) = data.split_at(16);
        Aes128CbcDec::new_from_slices(key, iv)
            .unwrap()
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .unwrap()
    }

    #[test]
    fn test_output_is_iv_plus_padded_blocks() {
        let key = [7u8; 16];
        let iv = [1u8; 16];
        let out = aes128_encrypt(&key, &iv, b"hello").unwrap();
        assert_eq!(&out[..16], &iv);
        assert_eq!(out.len(), 32);

        // Block-aligned input gains a full padding block.
        let aligned = aes128_encrypt(&key, &iv, &[0u8; 16]).unwrap();
        assert_eq!(aligned.len(), 48);
    }

    #[test]
    fn test_round_trip() {
        let key = [42u8; 16];
        let iv = [9u8; 16];
        let plain = b"BT /F1 12 Tf (secret) Tj ET".to_vec();
        let out = aes128_encrypt(&key, &iv, &plain).unwrap();
        assert_eq!(decrypt(&key, &out), plain);
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(aes128_encrypt(&[0u8; 5], &[0u8; 16], b"x").is_err());
    }
}

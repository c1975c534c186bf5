//! AES-256-GCM sealing with associated-data binding.
//!
//! Every sealed payload binds caller-chosen associated data (for chunks:
//! the plaintext hash plus the codec byte), so a ciphertext cannot be
//! replayed under a different identity or reinterpreted under the
//! opposite compression codec.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use aifs_types::error::CryptoError;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Output of a sealing operation. The tag is kept separate from the
/// ciphertext because the chunk file frame stores `nonce || tag || ct`.
#[derive(Debug, Clone)]
pub struct SealedBox {
    /// Fresh random nonce used for this sealing.
    pub nonce: [u8; NONCE_LEN],
    /// The 16-byte authentication tag.
    pub tag: [u8; TAG_LEN],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

/// Seals `plaintext` under `key`, binding `aad`, with a fresh random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<SealedBox, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadFailed)?;

    // aes-gcm appends the tag to the ciphertext.
    if sealed.len() < TAG_LEN {
        return Err(CryptoError::AeadFailed);
    }
    let tag_bytes = sealed.split_off(sealed.len() - TAG_LEN);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedBox {
        nonce,
        tag,
        ciphertext: sealed,
    })
}

/// Opens a sealed payload. Fails with [`CryptoError::AeadFailed`] if the
/// tag, nonce, key or associated data do not match.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"secret payload", b"context").unwrap();
        assert_eq!(sealed.ciphertext.len(), b"secret payload".len());
        let plain = open(&key, &sealed.nonce, &sealed.tag, &sealed.ciphertext, b"context").unwrap();
        assert_eq!(plain, b"secret payload");
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let key = [7u8; 32];
        let a = seal(&key, b"x", b"").unwrap();
        let b = seal(&key, b"x", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn wrong_aad_or_key_or_tag_fails() {
        let key = [7u8; 32];
        let sealed = seal(&key, b"payload", b"aad-1").unwrap();

        assert!(open(&key, &sealed.nonce, &sealed.tag, &sealed.ciphertext, b"aad-2").is_err());

        let other_key = [8u8; 32];
        assert!(open(&other_key, &sealed.nonce, &sealed.tag, &sealed.ciphertext, b"aad-1").is_err());

        let mut bad_tag = sealed.tag;
        bad_tag[0] ^= 1;
        assert!(open(&key, &sealed.nonce, &bad_tag, &sealed.ciphertext, b"aad-1").is_err());

        let mut bad_ct = sealed.ciphertext.clone();
        bad_ct[0] ^= 1;
        assert!(open(&key, &sealed.nonce, &sealed.tag, &bad_ct, b"aad-1").is_err());
    }
}

//! The abstract data-key provider.
//!
//! Chunks are encrypted under per-chunk data encryption keys (DEKs); the
//! KMS provider wraps DEKs under a master key identified by `key_id`.
//! Rotation re-wraps a DEK under a newer master key without touching the
//! chunk ciphertext. The default [`LocalKms`] holds its master keys in
//! process memory; production deployments substitute an external KMS
//! behind the same trait.

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use zeroize::Zeroizing;

use aifs_types::error::CryptoError;

use crate::aead;

/// Data encryption key length in bytes.
pub const DEK_LEN: usize = 32;

/// A DEK wrapped under a provider master key.
#[derive(Debug, Clone)]
pub struct WrappedKey {
    /// The opaque wrapped key material.
    pub wrapped_dek: Vec<u8>,
    /// Identifier of the wrapping master key.
    pub kms_key_id: String,
}

/// Abstract key-management provider.
pub trait KmsProvider: Send + Sync {
    /// Generates a fresh DEK and returns it alongside its wrapped form.
    fn generate_dek(&self) -> Result<(Zeroizing<[u8; DEK_LEN]>, WrappedKey), CryptoError>;

    /// Unwraps a DEK previously wrapped under `kms_key_id`.
    fn unwrap_dek(
        &self,
        wrapped_dek: &[u8],
        kms_key_id: &str,
    ) -> Result<Zeroizing<[u8; DEK_LEN]>, CryptoError>;

    /// Re-wraps an existing DEK under the provider's current master key,
    /// returning the new wrapped form. Chunk ciphertext is unaffected.
    fn rewrap(&self, wrapped_dek: &[u8], kms_key_id: &str) -> Result<WrappedKey, CryptoError> {
        let dek = self.unwrap_dek(wrapped_dek, kms_key_id)?;
        self.wrap_dek(&dek)
    }

    /// Wraps caller-supplied DEK material under the current master key.
    fn wrap_dek(&self, dek: &[u8; DEK_LEN]) -> Result<WrappedKey, CryptoError>;

    /// The id of the master key new wraps will use.
    fn current_key_id(&self) -> String;
}

/// AAD bound into every local wrap, so wrapped DEKs cannot be confused
/// with other sealed payloads.
const WRAP_CONTEXT: &[u8] = b"aifs-kms-dek-wrap-v1";

/// Process-local provider: master keys held in memory, keyed by id.
pub struct LocalKms {
    keys: RwLock<HashMap<String, [u8; 32]>>,
    current: RwLock<String>,
}

impl LocalKms {
    /// Creates a provider with a single freshly generated master key.
    pub fn new() -> Self {
        let mut master = [0u8; 32];
        OsRng.fill_bytes(&mut master);
        Self::with_master_key(master)
    }

    /// Creates a provider from caller-held master key material.
    pub fn with_master_key(master: [u8; 32]) -> Self {
        let key_id = Self::key_id_for(&master);
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), master);
        Self {
            keys: RwLock::new(keys),
            current: RwLock::new(key_id),
        }
    }

    /// Installs a fresh master key and makes it current. Older keys stay
    /// available for unwrapping until dropped.
    pub fn rotate(&self) -> String {
        let mut master = [0u8; 32];
        OsRng.fill_bytes(&mut master);
        let key_id = Self::key_id_for(&master);
        self.keys.write().insert(key_id.clone(), master);
        *self.current.write() = key_id.clone();
        tracing::info!(key_id, "rotated local KMS master key");
        key_id
    }

    fn key_id_for(master: &[u8; 32]) -> String {
        // Key ids are derived from the key, never reveal it, and stay
        // stable across restarts with the same material.
        let digest = blake3::hash(master);
        format!("local/{}", &digest.to_hex().as_str()[..16])
    }

    fn master_for(&self, key_id: &str) -> Result<[u8; 32], CryptoError> {
        self.keys
            .read()
            .get(key_id)
            .copied()
            .ok_or_else(|| CryptoError::UnknownKeyId(key_id.to_string()))
    }
}

impl Default for LocalKms {
    fn default() -> Self {
        Self::new()
    }
}

impl KmsProvider for LocalKms {
    fn generate_dek(&self) -> Result<(Zeroizing<[u8; DEK_LEN]>, WrappedKey), CryptoError> {
        let mut dek = Zeroizing::new([0u8; DEK_LEN]);
        OsRng.fill_bytes(dek.as_mut());
        let wrapped = self.wrap_dek(&dek)?;
        Ok((dek, wrapped))
    }

    fn wrap_dek(&self, dek: &[u8; DEK_LEN]) -> Result<WrappedKey, CryptoError> {
        let key_id = self.current_key_id();
        let master = self.master_for(&key_id)?;
        let sealed = aead::seal(&master, dek.as_ref(), WRAP_CONTEXT)?;

        // Wire form: nonce || tag || ciphertext, same frame as chunks.
        let mut wrapped = Vec::with_capacity(aead::NONCE_LEN + aead::TAG_LEN + sealed.ciphertext.len());
        wrapped.extend_from_slice(&sealed.nonce);
        wrapped.extend_from_slice(&sealed.tag);
        wrapped.extend_from_slice(&sealed.ciphertext);

        Ok(WrappedKey {
            wrapped_dek: wrapped,
            kms_key_id: key_id,
        })
    }

    fn unwrap_dek(
        &self,
        wrapped_dek: &[u8],
        kms_key_id: &str,
    ) -> Result<Zeroizing<[u8; DEK_LEN]>, CryptoError> {
        let master = self.master_for(kms_key_id)?;
        if wrapped_dek.len() < aead::NONCE_LEN + aead::TAG_LEN {
            return Err(CryptoError::InvalidKey("wrapped DEK too short".to_string()));
        }
        let (nonce_bytes, rest) = wrapped_dek.split_at(aead::NONCE_LEN);
        let (tag_bytes, ciphertext) = rest.split_at(aead::TAG_LEN);
        let nonce: [u8; aead::NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("bad wrapped DEK nonce".to_string()))?;
        let tag: [u8; aead::TAG_LEN] = tag_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("bad wrapped DEK tag".to_string()))?;

        let plain = aead::open(&master, &nonce, &tag, ciphertext, WRAP_CONTEXT)?;
        let dek: [u8; DEK_LEN] = plain
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("unwrapped DEK has wrong length".to_string()))?;
        Ok(Zeroizing::new(dek))
    }

    fn current_key_id(&self) -> String {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let kms = LocalKms::new();
        let (dek, wrapped) = kms.generate_dek().unwrap();
        let unwrapped = kms.unwrap_dek(&wrapped.wrapped_dek, &wrapped.kms_key_id).unwrap();
        assert_eq!(dek.as_ref(), unwrapped.as_ref());
    }

    #[test]
    fn unknown_key_id_is_rejected() {
        let kms = LocalKms::new();
        let (_, wrapped) = kms.generate_dek().unwrap();
        assert!(kms.unwrap_dek(&wrapped.wrapped_dek, "local/missing").is_err());
    }

    #[test]
    fn rotation_rewraps_without_changing_dek() {
        let kms = LocalKms::new();
        let (dek, wrapped) = kms.generate_dek().unwrap();
        let old_id = wrapped.kms_key_id.clone();

        let new_id = kms.rotate();
        assert_ne!(old_id, new_id);

        let rewrapped = kms.rewrap(&wrapped.wrapped_dek, &old_id).unwrap();
        assert_eq!(rewrapped.kms_key_id, new_id);

        let unwrapped = kms.unwrap_dek(&rewrapped.wrapped_dek, &rewrapped.kms_key_id).unwrap();
        assert_eq!(dek.as_ref(), unwrapped.as_ref());

        // Old wraps stay readable until the old key is dropped.
        assert!(kms.unwrap_dek(&wrapped.wrapped_dek, &old_id).is_ok());
    }

    #[test]
    fn stable_key_id_for_same_master() {
        let master = [5u8; 32];
        let a = LocalKms::with_master_key(master);
        let b = LocalKms::with_master_key(master);
        assert_eq!(a.current_key_id(), b.current_key_id());
    }
}

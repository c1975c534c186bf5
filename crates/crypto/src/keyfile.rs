//! Passphrase-wrapped on-disk format for the engine signing seed.
//!
//! Format V1:
//! `[ Magic: "AIFS-KEY" (8) ]`
//! `[ Version: u16 (2) ]`
//! `[ KDF Algo: u8 (1) ]`
//! `[ KDF Mem KiB: u32 (4) ]`
//! `[ KDF Iters: u32 (4) ]`
//! `[ KDF Lanes: u8 (1) ]`
//! `[ Salt: 16B ]`
//! `[ AEAD Algo: u8 (1) ]`
//! `[ Nonce: 12B ]`
//! `[ Tag: 16B ]`
//! `[ Ciphertext: N ]`
//!
//! Fields are manually packed big-endian for a stable, endian-independent
//! on-disk layout. The KDF parameters in the header are authoritative:
//! decryption derives the KEK with whatever the header claims, so future
//! parameter upgrades need no version bump.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

use aifs_types::error::CryptoError;

use crate::aead;

const HEADER_MAGIC: &[u8; 8] = b"AIFS-KEY";
const HEADER_VERSION: u16 = 1;
const HEADER_LEN: usize = 8 + 2 + 1 + 4 + 4 + 1 + 16 + 1 + 12 + 16; // 65 bytes

const KDF_ALGO_ARGON2ID: u8 = 1;
const KDF_MEM_KIB: u32 = 64 * 1024;
const KDF_ITERS: u32 = 3;
const KDF_LANES: u8 = 4;
const SALT_LEN: usize = 16;
const AEAD_ALGO_AES256GCM: u8 = 1;
const KEK_LEN: usize = 32;

const KEYFILE_AAD: &[u8] = b"aifs-signing-seed-v1";

/// A container for sensitive key material that zeroizes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

fn derive_kek(
    passphrase: &str,
    salt: &[u8],
    mem_kib: u32,
    iters: u32,
    lanes: u8,
) -> Result<[u8; KEK_LEN], CryptoError> {
    let params = Params::new(mem_kib, iters, lanes as u32, Some(KEK_LEN))
        .map_err(|e| CryptoError::OperationFailed(format!("bad Argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut kek = [0u8; KEK_LEN];
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut kek)
        .map_err(|e| CryptoError::OperationFailed(format!("Argon2 derivation failed: {e}")))?;
    Ok(kek)
}

/// Encrypts raw seed bytes under a passphrase into the V1 format.
pub fn encrypt_key(secret: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut kek = derive_kek(passphrase, &salt, KDF_MEM_KIB, KDF_ITERS, KDF_LANES)?;
    let sealed = aead::seal(&kek, secret, KEYFILE_AAD);
    kek.zeroize();
    let sealed = sealed?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.ciphertext.len());
    out.extend_from_slice(HEADER_MAGIC);
    out.extend_from_slice(&HEADER_VERSION.to_be_bytes());
    out.push(KDF_ALGO_ARGON2ID);
    out.extend_from_slice(&KDF_MEM_KIB.to_be_bytes());
    out.extend_from_slice(&KDF_ITERS.to_be_bytes());
    out.push(KDF_LANES);
    out.extend_from_slice(&salt);
    out.push(AEAD_ALGO_AES256GCM);
    out.extend_from_slice(&sealed.nonce);
    out.extend_from_slice(&sealed.tag);
    out.extend_from_slice(&sealed.ciphertext);
    Ok(out)
}

/// Decrypts a key file blob, honoring the versioned header.
pub fn decrypt_key(data: &[u8], passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
    if data.len() < HEADER_LEN {
        return Err(CryptoError::KeyFile("file too short".to_string()));
    }
    if &data[0..8] != HEADER_MAGIC {
        return Err(CryptoError::KeyFile("invalid file signature".to_string()));
    }
    let version = u16::from_be_bytes([data[8], data[9]]);
    if version != HEADER_VERSION {
        return Err(CryptoError::KeyFile(format!(
            "unsupported key format version {version}"
        )));
    }
    let kdf_algo = data[10];
    if kdf_algo != KDF_ALGO_ARGON2ID {
        return Err(CryptoError::KeyFile(format!("unsupported KDF {kdf_algo}")));
    }
    let mem_kib = u32::from_be_bytes([data[11], data[12], data[13], data[14]]);
    let iters = u32::from_be_bytes([data[15], data[16], data[17], data[18]]);
    let lanes = data[19];
    let salt = &data[20..36];
    let aead_algo = data[36];
    if aead_algo != AEAD_ALGO_AES256GCM {
        return Err(CryptoError::KeyFile(format!("unsupported AEAD {aead_algo}")));
    }
    let nonce: [u8; aead::NONCE_LEN] = data[37..49]
        .try_into()
        .map_err(|_| CryptoError::KeyFile("bad nonce".to_string()))?;
    let tag: [u8; aead::TAG_LEN] = data[49..65]
        .try_into()
        .map_err(|_| CryptoError::KeyFile("bad tag".to_string()))?;
    let ciphertext = &data[HEADER_LEN..];

    let mut kek = derive_kek(passphrase, salt, mem_kib, iters, lanes)?;
    let plain = aead::open(&kek, &nonce, &tag, ciphertext, KEYFILE_AAD);
    kek.zeroize();

    plain.map(SensitiveBytes).map_err(|_| {
        CryptoError::KeyFile("decryption failed (wrong passphrase or corrupted file)".to_string())
    })
}

/// Loads and decrypts a signing seed from disk.
pub fn load_seed(path: &Path, passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
    let encrypted = std::fs::read(path)
        .map_err(|e| CryptoError::KeyFile(format!("failed to read key file: {e}")))?;
    decrypt_key(&encrypted, passphrase)
}

/// Encrypts and writes a signing seed to disk.
pub fn store_seed(path: &Path, secret: &[u8], passphrase: &str) -> Result<(), CryptoError> {
    let encrypted = encrypt_key(secret, passphrase)?;
    std::fs::write(path, encrypted)
        .map_err(|e| CryptoError::KeyFile(format!("failed to write key file: {e}")))
}

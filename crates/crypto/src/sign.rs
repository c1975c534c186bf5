//! Ed25519 snapshot signing and verification.
//!
//! The signed message is canonical:
//! `"AIFS_SNAPSHOT:" + hex(merkle_root) + ":" + timestamp + ":" + namespace`
//! with the timestamp in RFC 3339 UTC second precision. Signatures are
//! deterministic per RFC 8032, so re-signing the same snapshot yields the
//! same 64 bytes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use aifs_types::error::CryptoError;
use aifs_types::id::Namespace;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Domain prefix of the snapshot message.
const SNAPSHOT_PREFIX: &str = "AIFS_SNAPSHOT:";

/// Builds the canonical snapshot message bytes.
pub fn snapshot_message(merkle_root: &[u8; 32], timestamp: &str, namespace: &Namespace) -> Vec<u8> {
    format!(
        "{}{}:{}:{}",
        SNAPSHOT_PREFIX,
        hex::encode(merkle_root),
        timestamp,
        namespace
    )
    .into_bytes()
}

/// The engine's snapshot signing keypair.
#[derive(Clone)]
pub struct SnapshotSigner {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl SnapshotSigner {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Reconstructs a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("signing seed must be 32 bytes".to_string()))?;
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();
        Ok(Self { signing, verifying })
    }

    /// Exports the 32-byte seed, zeroized on drop.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// The public verification key, 32 bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying.to_bytes()
    }

    /// Signs a snapshot, returning the raw 64-byte signature and its hex form.
    pub fn sign_snapshot(
        &self,
        merkle_root: &[u8; 32],
        timestamp: &str,
        namespace: &Namespace,
    ) -> ([u8; SIGNATURE_LEN], String) {
        let message = snapshot_message(merkle_root, timestamp, namespace);
        let sig = self.signing.sign(&message).to_bytes();
        let sig_hex = hex::encode(sig);
        (sig, sig_hex)
    }
}

impl std::fmt::Debug for SnapshotSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SnapshotSigner({})", hex::encode(self.public_key()))
    }
}

/// Verifies a snapshot signature against an explicit public key.
///
/// Returns `false` (never an error) for wrong keys or tampered fields;
/// errors are reserved for inputs that do not parse at all.
pub fn verify_snapshot(
    signature: &[u8],
    merkle_root: &[u8; 32],
    timestamp: &str,
    namespace: &Namespace,
    pubkey: &[u8; 32],
) -> Result<bool, CryptoError> {
    let sig_bytes: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
        CryptoError::InvalidSignature(format!("expected {SIGNATURE_LEN} bytes, got {}", signature.len()))
    })?;
    let sig = Signature::from_bytes(&sig_bytes);
    let key = VerifyingKey::from_bytes(pubkey)
        .map_err(|e| CryptoError::InvalidKey(format!("bad verification key: {e}")))?;
    let message = snapshot_message(merkle_root, timestamp, namespace);
    Ok(key.verify(&message, &sig).is_ok())
}

/// Hex-string front-end for [`verify_snapshot`].
pub fn verify_snapshot_hex(
    sig_hex: &str,
    merkle_root: &[u8; 32],
    timestamp: &str,
    namespace: &Namespace,
    pubkey: &[u8; 32],
) -> Result<bool, CryptoError> {
    let signature = hex::decode(sig_hex)
        .map_err(|e| CryptoError::InvalidSignature(format!("bad signature hex: {e}")))?;
    verify_snapshot(&signature, merkle_root, timestamp, namespace, pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn sign_verify_roundtrip() {
        let signer = SnapshotSigner::generate();
        let root = [0x11u8; 32];
        let ts = "2026-08-01T12:00:00Z";
        let (sig, sig_hex) = signer.sign_snapshot(&root, ts, &ns("prod"));

        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify_snapshot(&sig, &root, ts, &ns("prod"), &signer.public_key()).unwrap());
        assert!(verify_snapshot_hex(&sig_hex, &root, ts, &ns("prod"), &signer.public_key()).unwrap());
    }

    #[test]
    fn signatures_are_deterministic() {
        let signer = SnapshotSigner::generate();
        let root = [0x22u8; 32];
        let ts = "2026-08-01T12:00:00Z";
        let (a, _) = signer.sign_snapshot(&root, ts, &ns("prod"));
        let (b, _) = signer.sign_snapshot(&root, ts, &ns("prod"));
        assert_eq!(a, b);
    }

    #[test]
    fn tampering_any_field_fails_verification() {
        let signer = SnapshotSigner::generate();
        let root = [0x33u8; 32];
        let ts = "2026-08-01T12:00:00Z";
        let (sig, _) = signer.sign_snapshot(&root, ts, &ns("prod"));
        let key = signer.public_key();

        let mut bad_root = root;
        bad_root[0] ^= 1;
        assert!(!verify_snapshot(&sig, &bad_root, ts, &ns("prod"), &key).unwrap());
        assert!(!verify_snapshot(&sig, &root, "2026-08-01T12:00:01Z", &ns("prod"), &key).unwrap());
        assert!(!verify_snapshot(&sig, &root, ts, &ns("staging"), &key).unwrap());

        let other = SnapshotSigner::generate();
        assert!(!verify_snapshot(&sig, &root, ts, &ns("prod"), &other.public_key()).unwrap());

        let mut bad_sig = sig;
        bad_sig[10] ^= 0xff;
        assert!(!verify_snapshot(&bad_sig, &root, ts, &ns("prod"), &key).unwrap());
    }

    #[test]
    fn seed_roundtrip() {
        let signer = SnapshotSigner::generate();
        let restored = SnapshotSigner::from_seed(signer.seed().as_ref()).unwrap();
        assert_eq!(signer.public_key(), restored.public_key());
        assert!(SnapshotSigner::from_seed(&[0u8; 16]).is_err());
    }
}

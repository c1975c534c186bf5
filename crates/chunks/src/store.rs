use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

use aifs_crypto::{aead, KmsProvider};
use aifs_types::asset::{ChunkCodec, ChunkRecord};
use aifs_types::error::ChunkError;
use aifs_types::id::ChunkHash;

/// Frame prefix length: nonce plus tag.
const FRAME_PREFIX: usize = aead::NONCE_LEN + aead::TAG_LEN;

/// Valid zstd levels.
const LEVEL_RANGE: std::ops::RangeInclusive<i32> = 1..=22;

/// Result of a chunk write.
#[derive(Debug)]
pub enum PutOutcome {
    /// The chunk was new; the caller must persist this sidecar record.
    Written(ChunkRecord),
    /// A chunk with this hash already exists; the stored bytes and the
    /// existing sidecar record (including its `kms_key_id`) stand.
    Deduplicated,
}

/// Aggregate statistics for the metrics gauge.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreStats {
    /// Number of chunk files on disk.
    pub chunk_count: u64,
    /// Total bytes of stored chunk frames.
    pub stored_bytes: u64,
}

/// The on-disk, content-addressed chunk store.
///
/// Reads are lock-free; writes are idempotent on the content hash. An
/// exclusive lock file guards the root against a second process.
pub struct ChunkStore {
    root: PathBuf,
    kms: Arc<dyn KmsProvider>,
    _lock: File,
}

impl ChunkStore {
    /// Opens (creating if needed) a chunk store rooted at `root`.
    pub fn open(root: impl AsRef<Path>, kms: Arc<dyn KmsProvider>) -> Result<Self, ChunkError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let lock_path = root.join(".lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock.try_lock_exclusive().map_err(|_| ChunkError::Locked)?;

        Ok(Self {
            root,
            kms,
            _lock: lock,
        })
    }

    fn chunk_path(&self, hash: &ChunkHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }

    /// Whether a chunk with this hash is already stored.
    pub fn contains(&self, hash: &ChunkHash) -> bool {
        self.chunk_path(hash).exists()
    }

    /// Stores `plaintext`, compressing at `level` and encrypting under a
    /// fresh data key. Returns the plaintext hash and whether a write
    /// actually happened.
    pub fn put(&self, plaintext: &[u8], level: i32) -> Result<(ChunkHash, PutOutcome), ChunkError> {
        if !LEVEL_RANGE.contains(&level) {
            return Err(ChunkError::InvalidLevel(level));
        }

        let hash = ChunkHash(*blake3::hash(plaintext).as_bytes());
        if self.contains(&hash) {
            debug!(chunk = %hash, "chunk already present, deduplicated");
            aifs_telemetry::store_metrics().inc_chunks_deduplicated();
            return Ok((hash, PutOutcome::Deduplicated));
        }

        // Compress, falling back to the plaintext when compression does
        // not shrink the payload.
        let compressed = zstd::bulk::compress(plaintext, level)
            .map_err(|e| ChunkError::Compression(e.to_string()))?;
        let (codec, to_seal) = if compressed.len() >= plaintext.len() {
            (ChunkCodec::None, plaintext)
        } else {
            (ChunkCodec::Zstd, compressed.as_slice())
        };

        let (dek, wrapped) = self.kms.generate_dek()?;
        let sealed = aead::seal(&dek, to_seal, &chunk_aad(&hash, codec))?;

        self.write_frame(&hash, &sealed)?;
        aifs_telemetry::store_metrics()
            .inc_chunk_bytes_written((FRAME_PREFIX + sealed.ciphertext.len()) as u64);

        let record = ChunkRecord {
            hash,
            size_plain: plaintext.len() as u64,
            size_stored: sealed.ciphertext.len() as u64,
            wrapped_dek: wrapped.wrapped_dek,
            kms_key_id: wrapped.kms_key_id,
            codec,
            compression_level: if codec == ChunkCodec::Zstd { level as u8 } else { 0 },
            refcount: 0,
        };
        Ok((hash, PutOutcome::Written(record)))
    }

    fn write_frame(&self, hash: &ChunkHash, sealed: &aead::SealedBox) -> Result<(), ChunkError> {
        let path = self.chunk_path(hash);
        let shard = path
            .parent()
            .ok_or_else(|| ChunkError::Io(std::io::Error::other("chunk path has no parent")))?;
        fs::create_dir_all(shard)?;

        // Write to a temp name, fsync, then rename: a crash mid-write
        // never leaves a partial frame under the content address.
        let tmp = shard.join(format!(".tmp-{}", hash.to_hex()));
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&sealed.nonce)?;
            file.write_all(&sealed.tag)?;
            file.write_all(&sealed.ciphertext)?;
            file.sync_all()?;
        }
        match fs::rename(&tmp, &path) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A concurrent writer may have landed the same content first.
                let _ = fs::remove_file(&tmp);
                if path.exists() {
                    Ok(())
                } else {
                    Err(ChunkError::Io(e))
                }
            }
        }
    }

    /// Retrieves and verifies the plaintext of a chunk.
    ///
    /// `record` is the sidecar row persisted at write time. AEAD failure
    /// raises [`ChunkError::Integrity`]; a post-decompression hash
    /// mismatch raises [`ChunkError::Corruption`].
    pub fn get(&self, hash: &ChunkHash, record: &ChunkRecord) -> Result<Vec<u8>, ChunkError> {
        let path = self.chunk_path(hash);
        let frame = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChunkError::NotFound(*hash))
            }
            Err(e) => return Err(ChunkError::Io(e)),
        };
        if frame.len() < FRAME_PREFIX {
            return Err(ChunkError::Truncated(*hash));
        }
        let (nonce_bytes, rest) = frame.split_at(aead::NONCE_LEN);
        let (tag_bytes, ciphertext) = rest.split_at(aead::TAG_LEN);
        let nonce: [u8; aead::NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| ChunkError::Truncated(*hash))?;
        let tag: [u8; aead::TAG_LEN] = tag_bytes
            .try_into()
            .map_err(|_| ChunkError::Truncated(*hash))?;

        let dek = self
            .kms
            .unwrap_dek(&record.wrapped_dek, &record.kms_key_id)?;
        let opened = aead::open(&dek, &nonce, &tag, ciphertext, &chunk_aad(hash, record.codec))
            .map_err(|_| {
                error!(chunk = %hash, "AEAD tag mismatch reading chunk");
                ChunkError::Integrity(*hash)
            })?;

        let plaintext = match record.codec {
            ChunkCodec::None => opened,
            ChunkCodec::Zstd => zstd::bulk::decompress(&opened, record.size_plain as usize)
                .map_err(|e| ChunkError::Compression(e.to_string()))?,
        };

        if blake3::hash(&plaintext).as_bytes() != &hash.0 {
            error!(chunk = %hash, "plaintext hash mismatch after decrypt");
            return Err(ChunkError::Corruption(*hash));
        }
        Ok(plaintext)
    }

    /// Removes a chunk file. Admin-only: callers must have verified the
    /// refcount reached zero in the metadata store.
    pub fn remove(&self, hash: &ChunkHash) -> Result<(), ChunkError> {
        match fs::remove_file(self.chunk_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ChunkError::NotFound(*hash)),
            Err(e) => Err(ChunkError::Io(e)),
        }
    }

    /// Walks the store and aggregates file counts and sizes.
    pub fn stats(&self) -> Result<StoreStats, ChunkError> {
        let mut stats = StoreStats::default();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                stats.chunk_count += 1;
                stats.stored_bytes += entry.metadata()?.len();
            }
        }
        Ok(stats)
    }
}

/// Associated data binding a chunk's identity and codec into its AEAD,
/// so a ciphertext cannot be replayed under another hash or decoded
/// under the opposite codec.
fn chunk_aad(hash: &ChunkHash, codec: ChunkCodec) -> Vec<u8> {
    let mut aad = Vec::with_capacity(ChunkHash::LEN + 1);
    aad.extend_from_slice(&hash.0);
    aad.push(codec.as_byte());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use aifs_crypto::LocalKms;
    use rand::RngCore;

    fn store(dir: &Path) -> ChunkStore {
        ChunkStore::open(dir, Arc::new(LocalKms::new())).unwrap()
    }

    fn written(outcome: PutOutcome) -> ChunkRecord {
        match outcome {
            PutOutcome::Written(record) => record,
            PutOutcome::Deduplicated => panic!("expected a fresh write"),
        }
    }

    #[test]
    fn roundtrip_compressible() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let plaintext = b"repetition repetition repetition repetition".repeat(64);
        let (hash, outcome) = store.put(&plaintext, 3).unwrap();
        let record = written(outcome);

        assert_eq!(record.codec, ChunkCodec::Zstd);
        assert_eq!(record.compression_level, 3);
        assert!(record.size_stored < record.size_plain);
        assert_eq!(hash.0, *blake3::hash(&plaintext).as_bytes());
        assert_eq!(store.get(&hash, &record).unwrap(), plaintext);
    }

    #[test]
    fn roundtrip_incompressible_stores_plain() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut plaintext = vec![0u8; 4096];
        rand::thread_rng().fill_bytes(&mut plaintext);
        let (hash, outcome) = store.put(&plaintext, 1).unwrap();
        let record = written(outcome);

        assert_eq!(record.codec, ChunkCodec::None);
        assert_eq!(record.size_stored, record.size_plain);
        assert_eq!(store.get(&hash, &record).unwrap(), plaintext);
    }

    #[test]
    fn dedup_on_second_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let (h1, o1) = store.put(b"same bytes", 1).unwrap();
        assert!(matches!(o1, PutOutcome::Written(_)));
        let (h2, o2) = store.put(b"same bytes", 1).unwrap();
        assert_eq!(h1, h2);
        assert!(matches!(o2, PutOutcome::Deduplicated));
        assert_eq!(store.stats().unwrap().chunk_count, 1);
    }

    #[test]
    fn invalid_level_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(store.put(b"x", 0), Err(ChunkError::InvalidLevel(0))));
        assert!(matches!(store.put(b"x", 23), Err(ChunkError::InvalidLevel(23))));
    }

    #[test]
    fn tampered_frame_fails_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let (hash, outcome) = store.put(b"precious data", 1).unwrap();
        let record = written(outcome);

        let path = dir.path().join(&hash.to_hex()[..2]).join(hash.to_hex());
        let mut frame = fs::read(&path).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        fs::write(&path, frame).unwrap();

        assert!(matches!(
            store.get(&hash, &record),
            Err(ChunkError::Integrity(_))
        ));
    }

    #[test]
    fn missing_chunk_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let (hash, outcome) = store.put(b"ephemeral", 1).unwrap();
        let record = written(outcome);
        store.remove(&hash).unwrap();

        assert!(matches!(
            store.get(&hash, &record),
            Err(ChunkError::NotFound(_))
        ));
        assert!(matches!(store.remove(&hash), Err(ChunkError::NotFound(_))));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _first = store(dir.path());
        assert!(matches!(
            ChunkStore::open(dir.path(), Arc::new(LocalKms::new())),
            Err(ChunkError::Locked)
        ));
    }
}

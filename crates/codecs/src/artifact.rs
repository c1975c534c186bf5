//! Artifact payloads.
//!
//! An artifact is a ZIP archive whose first entry is `manifest.json`: a
//! JSON record naming the artifact, its version, its file entries (path,
//! size, mime, BLAKE3 content hash) and its dependencies. Write-side
//! validation decompresses every referenced entry and checks its hash;
//! read-side accessors list entries and fetch single files without
//! touching unreferenced entries.

use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use aifs_types::error::CodecError;

/// Name of the manifest entry inside the archive.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// One file entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path of the entry inside the archive.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// MIME type of the content.
    pub mime: String,
    /// Lowercase-hex BLAKE3-256 of the uncompressed content.
    pub content_hash: String,
}

/// The artifact manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Artifact name.
    pub name: String,
    /// Artifact version string.
    pub version: String,
    /// File entries, in archive order.
    pub files: Vec<ArtifactEntry>,
    /// Names of artifacts this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::Malformed {
        kind: "artifact",
        reason: reason.into(),
    }
}

/// Builds a manifest for the given files, computing sizes and hashes.
pub fn build_manifest(
    name: &str,
    version: &str,
    files: &[(String, Vec<u8>)],
    dependencies: Vec<String>,
) -> ArtifactManifest {
    let entries = files
        .iter()
        .map(|(path, bytes)| ArtifactEntry {
            path: path.clone(),
            size: bytes.len() as u64,
            mime: "application/octet-stream".to_string(),
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        })
        .collect();
    ArtifactManifest {
        name: name.to_string(),
        version: version.to_string(),
        files: entries,
        dependencies,
    }
}

/// Encodes a manifest and its files into the ZIP payload. The manifest
/// must describe exactly the provided files.
pub fn encode(
    manifest: &ArtifactManifest,
    files: &[(String, Vec<u8>)],
) -> Result<Vec<u8>, CodecError> {
    if manifest.files.len() != files.len() {
        return Err(malformed(format!(
            "manifest lists {} files, {} provided",
            manifest.files.len(),
            files.len()
        )));
    }
    for entry in &manifest.files {
        let found = files
            .iter()
            .find(|(path, _)| path == &entry.path)
            .ok_or_else(|| CodecError::MissingEntry(entry.path.clone()))?;
        if found.1.len() as u64 != entry.size {
            return Err(CodecError::EntryMismatch {
                path: entry.path.clone(),
                reason: format!("size {} != manifest {}", found.1.len(), entry.size),
            });
        }
        let hash = blake3::hash(&found.1).to_hex().to_string();
        if hash != entry.content_hash {
            return Err(CodecError::EntryMismatch {
                path: entry.path.clone(),
                reason: "content hash disagrees with manifest".to_string(),
            });
        }
    }

    let manifest_json =
        serde_json::to_vec_pretty(manifest).map_err(|e| malformed(e.to_string()))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(MANIFEST_ENTRY, options)
        .map_err(|e| malformed(e.to_string()))?;
    writer
        .write_all(&manifest_json)
        .map_err(|e| malformed(e.to_string()))?;
    for (path, bytes) in files {
        writer
            .start_file(path.as_str(), options)
            .map_err(|e| malformed(e.to_string()))?;
        writer
            .write_all(bytes)
            .map_err(|e| malformed(e.to_string()))?;
    }
    let cursor = writer.finish().map_err(|e| malformed(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, CodecError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| malformed(format!("not a ZIP archive: {e}")))
}

/// Reads and parses the manifest entry, decompressing only it.
pub fn manifest(bytes: &[u8]) -> Result<ArtifactManifest, CodecError> {
    let mut archive = open_archive(bytes)?;
    let mut entry = archive
        .by_name(MANIFEST_ENTRY)
        .map_err(|_| CodecError::MissingEntry(MANIFEST_ENTRY.to_string()))?;
    let mut json = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut json)
        .map_err(|e| malformed(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| malformed(format!("bad manifest: {e}")))
}

/// Lists `(path, uncompressed_size)` for every entry without
/// decompressing any of them.
pub fn entries(bytes: &[u8]) -> Result<Vec<(String, u64)>, CodecError> {
    let mut archive = open_archive(bytes)?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| malformed(e.to_string()))?;
        out.push((entry.name().to_string(), entry.size()));
    }
    Ok(out)
}

/// Decompresses a single named entry.
pub fn read_file(bytes: &[u8], path: &str) -> Result<Vec<u8>, CodecError> {
    let mut archive = open_archive(bytes)?;
    let mut entry = archive
        .by_name(path)
        .map_err(|_| CodecError::MissingEntry(path.to_string()))?;
    let mut out = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut out)
        .map_err(|e| malformed(e.to_string()))?;
    Ok(out)
}

/// Full write-side validation: parses the manifest, confirms every
/// referenced entry exists with the declared size, and verifies each
/// entry's content hash.
pub fn validate(bytes: &[u8]) -> Result<ArtifactManifest, CodecError> {
    let parsed = manifest(bytes)?;
    let listed = entries(bytes)?;

    for entry in &parsed.files {
        let found = listed
            .iter()
            .find(|(path, _)| path == &entry.path)
            .ok_or_else(|| CodecError::MissingEntry(entry.path.clone()))?;
        if found.1 != entry.size {
            return Err(CodecError::EntryMismatch {
                path: entry.path.clone(),
                reason: format!("archive size {} != manifest {}", found.1, entry.size),
            });
        }
        let content = read_file(bytes, &entry.path)?;
        let hash = blake3::hash(&content).to_hex().to_string();
        if hash != entry.content_hash {
            return Err(CodecError::EntryMismatch {
                path: entry.path.clone(),
                reason: "content hash disagrees with manifest".to_string(),
            });
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<(String, Vec<u8>)> {
        vec![
            ("model/weights.bin".to_string(), vec![1u8; 2048]),
            ("config.yaml".to_string(), b"layers: 12\n".to_vec()),
        ]
    }

    #[test]
    fn encode_validate_roundtrip() {
        let files = sample_files();
        let manifest_rec = build_manifest("resnet", "1.2.0", &files, vec!["base-weights".into()]);
        let payload = encode(&manifest_rec, &files).unwrap();

        let validated = validate(&payload).unwrap();
        assert_eq!(validated, manifest_rec);

        let listing = entries(&payload).unwrap();
        assert_eq!(listing.len(), 3); // manifest + 2 files
        assert_eq!(listing[0].0, MANIFEST_ENTRY);

        assert_eq!(read_file(&payload, "config.yaml").unwrap(), b"layers: 12\n");
    }

    #[test]
    fn missing_entry_rejected() {
        let files = sample_files();
        let mut manifest_rec = build_manifest("m", "1", &files, Vec::new());
        manifest_rec.files.push(ArtifactEntry {
            path: "ghost.bin".to_string(),
            size: 1,
            mime: "application/octet-stream".to_string(),
            content_hash: blake3::hash(b"x").to_hex().to_string(),
        });
        assert!(matches!(
            encode(&manifest_rec, &files),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn tampered_content_hash_rejected() {
        let files = sample_files();
        let mut manifest_rec = build_manifest("m", "1", &files, Vec::new());
        manifest_rec.files[0].content_hash = "00".repeat(32);
        assert!(matches!(
            encode(&manifest_rec, &files),
            Err(CodecError::EntryMismatch { .. })
        ));
    }

    #[test]
    fn tampered_archive_fails_validation() {
        let files = sample_files();
        let manifest_rec = build_manifest("m", "1", &files, Vec::new());
        let payload = encode(&manifest_rec, &files).unwrap();

        // Re-encode with different content under the same manifest.
        let mut other_files = sample_files();
        other_files[1].1 = b"layers: 13\n".to_vec();
        assert!(encode(&manifest_rec, &other_files).is_err());

        // Raw byte tamper somewhere in the middle corrupts the archive.
        let mut bad = payload.clone();
        let mid = bad.len() / 2;
        bad[mid] ^= 0xff;
        assert!(validate(&bad).is_err());
    }

    #[test]
    fn not_a_zip_rejected() {
        assert!(validate(b"PK but not really").is_err());
        assert!(manifest(&[]).is_err());
    }
}

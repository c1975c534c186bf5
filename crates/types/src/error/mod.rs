//! Core error types for the AIFS engine.
//!
//! Each storage-plane component raises its own `thiserror` enum; the
//! engine wraps them into [`EngineError`] and maps every variant onto a
//! [`StatusKind`] for the RPC boundary. Every variant also carries a
//! stable machine-readable string code via [`ErrorCode`] so that clients
//! and metrics can match on errors without parsing display strings.

use thiserror::Error;

use crate::id::{AssetId, ChunkHash, SnapshotId};
use crate::tx::{TxId, TxState};

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// RPC-level status classification, mirroring the wire status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Success.
    Ok,
    /// Malformed request, codec validation failure, unknown kind.
    InvalidArgument,
    /// Entity missing or not yet visible.
    NotFound,
    /// Tag re-creation or duplicate snapshot.
    AlreadyExists,
    /// Commit with unmet parent visibility; illegal state transition.
    FailedPrecondition,
    /// Capability token lacks the required method or namespace.
    PermissionDenied,
    /// Missing, malformed or expired capability token.
    Unauthenticated,
    /// Transaction conflict or cancellation during commit.
    Aborted,
    /// Unexpected bug, including data-integrity failures.
    Internal,
    /// Transient I/O or KMS failure; retryable.
    Unavailable,
    /// Deadline expired before completion.
    DeadlineExceeded,
    /// Caller cancelled the operation.
    Cancelled,
}

impl StatusKind {
    /// Whether a client may retry the failed operation verbatim.
    ///
    /// Retrying is always safe for content-addressed writes, but only
    /// `Unavailable` signals that a retry is likely to succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Errors raised by the content-addressed chunk store.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// The requested chunk is not present in the store.
    #[error("chunk not found: {0}")]
    NotFound(ChunkHash),
    /// AEAD authentication failed; the ciphertext or its context was tampered.
    #[error("AEAD tag mismatch for chunk {0}")]
    Integrity(ChunkHash),
    /// Decrypted plaintext no longer hashes to the chunk id.
    #[error("plaintext hash mismatch for chunk {0}")]
    Corruption(ChunkHash),
    /// The stored frame is too short to contain nonce and tag.
    #[error("truncated chunk frame for {0}")]
    Truncated(ChunkHash),
    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),
    /// The requested zstd level is outside `1..=22`.
    #[error("invalid compression level {0}")]
    InvalidLevel(i32),
    /// Underlying filesystem failure; retryable at a higher level.
    #[error("chunk store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Another process holds the store lock.
    #[error("chunk store is locked by another process")]
    Locked,
    /// Failure in the crypto layer while sealing or opening a chunk.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ErrorCode for ChunkError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CHUNK_NOT_FOUND",
            Self::Integrity(_) => "CHUNK_AEAD_MISMATCH",
            Self::Corruption(_) => "CHUNK_HASH_MISMATCH",
            Self::Truncated(_) => "CHUNK_TRUNCATED",
            Self::Compression(_) => "CHUNK_COMPRESSION_FAILED",
            Self::InvalidLevel(_) => "CHUNK_INVALID_LEVEL",
            Self::Io(_) => "CHUNK_IO_ERROR",
            Self::Locked => "CHUNK_STORE_LOCKED",
            Self::Crypto(e) => e.code(),
        }
    }
}

impl ChunkError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::NotFound(_) => StatusKind::NotFound,
            Self::Integrity(_) | Self::Corruption(_) | Self::Truncated(_) => StatusKind::Internal,
            Self::Compression(_) => StatusKind::Internal,
            Self::InvalidLevel(_) => StatusKind::InvalidArgument,
            Self::Io(_) | Self::Locked => StatusKind::Unavailable,
            Self::Crypto(e) => e.status(),
        }
    }
}

/// Errors raised by signing, verification and key management.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be parsed or has the wrong length.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A signature could not be parsed or has the wrong length.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// AEAD encryption or decryption failed.
    #[error("AEAD operation failed")]
    AeadFailed,
    /// The KMS provider does not know the given key id.
    #[error("unknown KMS key id: {0}")]
    UnknownKeyId(String),
    /// The KMS provider is unreachable; retryable.
    #[error("KMS unavailable: {0}")]
    KmsUnavailable(String),
    /// A key file was malformed or used an unsupported version.
    #[error("key file rejected: {0}")]
    KeyFile(String),
    /// Generic failure in a crypto primitive.
    #[error("crypto operation failed: {0}")]
    OperationFailed(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::AeadFailed => "CRYPTO_AEAD_FAILED",
            Self::UnknownKeyId(_) => "CRYPTO_UNKNOWN_KEY_ID",
            Self::KmsUnavailable(_) => "CRYPTO_KMS_UNAVAILABLE",
            Self::KeyFile(_) => "CRYPTO_KEY_FILE_REJECTED",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
        }
    }
}

impl CryptoError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::InvalidKey(_) | Self::InvalidSignature(_) => StatusKind::InvalidArgument,
            Self::AeadFailed => StatusKind::Internal,
            Self::UnknownKeyId(_) => StatusKind::NotFound,
            Self::KmsUnavailable(_) => StatusKind::Unavailable,
            Self::KeyFile(_) => StatusKind::InvalidArgument,
            Self::OperationFailed(_) => StatusKind::Internal,
        }
    }
}

/// Errors raised by payload codecs and validators.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload does not parse under the declared kind's encoding.
    #[error("malformed {kind} payload: {reason}")]
    Malformed {
        /// Kind name the payload was validated against.
        kind: &'static str,
        /// What failed to parse.
        reason: String,
    },
    /// Tensor buffer length disagrees with the header's dtype and shape.
    #[error("tensor buffer length {got} does not match header ({expected} bytes)")]
    TensorLength {
        /// Bytes implied by dtype and shape.
        expected: u64,
        /// Bytes actually present.
        got: u64,
    },
    /// Unsupported tensor dtype discriminant.
    #[error("unsupported tensor dtype {0}")]
    UnsupportedDtype(i32),
    /// Embed header dimension differs from the vector length.
    #[error("embedding dimension {declared} does not match vector length {actual}")]
    DimensionMismatch {
        /// Dimension declared in the header.
        declared: u32,
        /// Actual component count.
        actual: u32,
    },
    /// Artifact manifest references an entry missing from the ZIP payload.
    #[error("artifact entry {0:?} missing from archive")]
    MissingEntry(String),
    /// Artifact manifest disagrees with archive entry sizes or hashes.
    #[error("artifact entry {path:?} mismatch: {reason}")]
    EntryMismatch {
        /// Manifest path of the entry.
        path: String,
        /// What disagreed.
        reason: String,
    },
    /// The kind discriminant is unknown.
    #[error("unknown asset kind {0:?}")]
    UnknownKind(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "CODEC_MALFORMED",
            Self::TensorLength { .. } => "CODEC_TENSOR_LENGTH",
            Self::UnsupportedDtype(_) => "CODEC_UNSUPPORTED_DTYPE",
            Self::DimensionMismatch { .. } => "CODEC_DIMENSION_MISMATCH",
            Self::MissingEntry(_) => "CODEC_MISSING_ENTRY",
            Self::EntryMismatch { .. } => "CODEC_ENTRY_MISMATCH",
            Self::UnknownKind(_) => "CODEC_UNKNOWN_KIND",
        }
    }
}

impl CodecError {
    /// RPC status classification: every codec failure is a caller error.
    pub fn status(&self) -> StatusKind {
        StatusKind::InvalidArgument
    }
}

/// Errors raised by the durable metadata store.
#[derive(Debug, Error)]
pub enum MetaError {
    /// A generic error from the underlying embedded database.
    #[error("metadata backend error: {0}")]
    Backend(String),
    /// Serializing a record for storage failed.
    #[error("metadata encode error: {0}")]
    Encode(String),
    /// Deserializing a stored record failed.
    #[error("metadata decode error: {0}")]
    Decode(String),
    /// The requested row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity family (asset, snapshot, branch, ...).
        entity: &'static str,
        /// The missing key, rendered.
        key: String,
    },
    /// An immutable row already exists under the key.
    #[error("{entity} already exists: {key}")]
    AlreadyExists {
        /// Entity family.
        entity: &'static str,
        /// The conflicting key, rendered.
        key: String,
    },
    /// Inserting the candidate lineage edges would create a cycle.
    #[error("lineage cycle detected through {0}")]
    LineageCycle(AssetId),
    /// The on-disk schema version is newer than this build understands.
    #[error("unsupported metadata schema version {0}")]
    SchemaVersion(u32),
    /// An identifier failed to parse.
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
    /// A namespace name failed validation.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),
}

impl ErrorCode for MetaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "META_BACKEND_ERROR",
            Self::Encode(_) => "META_ENCODE_ERROR",
            Self::Decode(_) => "META_DECODE_ERROR",
            Self::NotFound { .. } => "META_NOT_FOUND",
            Self::AlreadyExists { .. } => "META_ALREADY_EXISTS",
            Self::LineageCycle(_) => "META_LINEAGE_CYCLE",
            Self::SchemaVersion(_) => "META_SCHEMA_VERSION",
            Self::InvalidId(_) => "META_INVALID_ID",
            Self::InvalidNamespace(_) => "META_INVALID_NAMESPACE",
        }
    }
}

impl MetaError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::Backend(_) => StatusKind::Unavailable,
            Self::Encode(_) | Self::Decode(_) | Self::SchemaVersion(_) => StatusKind::Internal,
            Self::NotFound { .. } => StatusKind::NotFound,
            Self::AlreadyExists { .. } => StatusKind::AlreadyExists,
            Self::LineageCycle(_) => StatusKind::FailedPrecondition,
            Self::InvalidId(_) | Self::InvalidNamespace(_) => StatusKind::InvalidArgument,
        }
    }
}

/// Errors raised by the transaction manager.
#[derive(Debug, Error)]
pub enum TxError {
    /// No transaction with the given id exists.
    #[error("unknown transaction {0}")]
    Unknown(TxId),
    /// The operation requires the transaction to be in a different state.
    #[error("transaction {tx_id} is {state:?}; expected {expected:?}")]
    WrongState {
        /// Transaction id.
        tx_id: TxId,
        /// Observed state.
        state: TxState,
        /// State the operation requires.
        expected: TxState,
    },
    /// A requested state transition is not part of the state machine.
    #[error("illegal transition {from:?} -> {to:?} for transaction {tx_id}")]
    IllegalTransition {
        /// Transaction id.
        tx_id: TxId,
        /// Current state.
        from: TxState,
        /// Requested state.
        to: TxState,
    },
    /// A declared parent is not visible, so the commit cannot proceed.
    #[error("parent {parent} of transaction {tx_id} is not visible")]
    ParentNotVisible {
        /// Transaction id.
        tx_id: TxId,
        /// The invisible parent.
        parent: AssetId,
    },
    /// The commit was interrupted by cancellation.
    #[error("transaction {0} aborted")]
    Aborted(TxId),
    /// Durable mirroring of the transaction failed.
    #[error(transparent)]
    Meta(#[from] MetaError),
}

impl ErrorCode for TxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "TX_UNKNOWN",
            Self::WrongState { .. } => "TX_WRONG_STATE",
            Self::IllegalTransition { .. } => "TX_ILLEGAL_TRANSITION",
            Self::ParentNotVisible { .. } => "TX_PARENT_NOT_VISIBLE",
            Self::Aborted(_) => "TX_ABORTED",
            Self::Meta(e) => e.code(),
        }
    }
}

impl TxError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::Unknown(_) => StatusKind::NotFound,
            Self::WrongState { .. }
            | Self::IllegalTransition { .. }
            | Self::ParentNotVisible { .. } => StatusKind::FailedPrecondition,
            Self::Aborted(_) => StatusKind::Aborted,
            Self::Meta(e) => e.status(),
        }
    }
}

/// Errors raised by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Vector length disagrees with the namespace dimension.
    #[error("vector dimension {got} does not match namespace dimension {expected}")]
    DimensionMismatch {
        /// Dimension fixed on first insert.
        expected: u32,
        /// Dimension of the offered vector.
        got: u32,
    },
    /// The asset has no vector in this index.
    #[error("no vector indexed for asset {0}")]
    NotFound(AssetId),
    /// A query vector contained a non-finite component.
    #[error("query vector contains non-finite components")]
    NonFinite,
}

impl ErrorCode for IndexError {
    fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "INDEX_DIMENSION_MISMATCH",
            Self::NotFound(_) => "INDEX_NOT_FOUND",
            Self::NonFinite => "INDEX_NON_FINITE",
        }
    }
}

impl IndexError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::DimensionMismatch { .. } | Self::NonFinite => StatusKind::InvalidArgument,
            Self::NotFound(_) => StatusKind::NotFound,
        }
    }
}

/// Errors raised while minting or verifying capability tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing capability token")]
    MissingToken,
    /// The token failed to parse.
    #[error("malformed capability token: {0}")]
    Malformed(String),
    /// The MAC chain did not verify; the token was forged or altered.
    #[error("capability token MAC mismatch")]
    MacMismatch,
    /// An `expires` caveat lies in the past.
    #[error("capability token expired at {0}")]
    Expired(u64),
    /// No `method` caveat admits the invoked method.
    #[error("method {0:?} not permitted by token")]
    MethodNotAllowed(String),
    /// A `namespace` caveat excludes the requested namespace.
    #[error("namespace {0:?} not permitted by token")]
    NamespaceNotAllowed(String),
    /// A caveat failed to parse.
    #[error("unintelligible caveat: {0:?}")]
    BadCaveat(String),
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "AUTH_MISSING_TOKEN",
            Self::Malformed(_) => "AUTH_MALFORMED_TOKEN",
            Self::MacMismatch => "AUTH_MAC_MISMATCH",
            Self::Expired(_) => "AUTH_TOKEN_EXPIRED",
            Self::MethodNotAllowed(_) => "AUTH_METHOD_NOT_ALLOWED",
            Self::NamespaceNotAllowed(_) => "AUTH_NAMESPACE_NOT_ALLOWED",
            Self::BadCaveat(_) => "AUTH_BAD_CAVEAT",
        }
    }
}

impl AuthError {
    /// RPC status classification: identity failures are `Unauthenticated`,
    /// capability failures are `PermissionDenied`.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::MissingToken | Self::Malformed(_) | Self::MacMismatch | Self::Expired(_) => {
                StatusKind::Unauthenticated
            }
            Self::MethodNotAllowed(_) | Self::NamespaceNotAllowed(_) | Self::BadCaveat(_) => {
                StatusKind::PermissionDenied
            }
        }
    }
}

/// The engine-level error, wrapping every component error plus the
/// orchestration-only failure modes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Chunk store failure.
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    /// Crypto or KMS failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Payload validation failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Metadata store failure.
    #[error(transparent)]
    Meta(#[from] MetaError),
    /// Transaction manager failure.
    #[error(transparent)]
    Tx(#[from] TxError),
    /// Vector index failure.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Capability token failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The asset exists but its creating transaction has not committed.
    #[error("asset {0} is not visible")]
    NotVisible(AssetId),
    /// Snapshot signature verification failed.
    #[error("snapshot {0} failed signature verification")]
    SnapshotVerification(SnapshotId),
    /// The caller cancelled the operation; in-flight state was rolled back.
    #[error("operation cancelled")]
    Cancelled,
    /// The deadline expired; in-flight state was rolled back.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Chunk(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Codec(e) => e.code(),
            Self::Meta(e) => e.code(),
            Self::Tx(e) => e.code(),
            Self::Index(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::NotVisible(_) => "ENGINE_NOT_VISIBLE",
            Self::SnapshotVerification(_) => "ENGINE_SNAPSHOT_VERIFICATION",
            Self::Cancelled => "ENGINE_CANCELLED",
            Self::DeadlineExceeded => "ENGINE_DEADLINE_EXCEEDED",
            Self::Internal(_) => "ENGINE_INTERNAL",
        }
    }
}

impl EngineError {
    /// RPC status classification.
    pub fn status(&self) -> StatusKind {
        match self {
            Self::Chunk(e) => e.status(),
            Self::Crypto(e) => e.status(),
            Self::Codec(e) => e.status(),
            Self::Meta(e) => e.status(),
            Self::Tx(e) => e.status(),
            Self::Index(e) => e.status(),
            Self::Auth(e) => e.status(),
            Self::NotVisible(_) => StatusKind::NotFound,
            Self::SnapshotVerification(_) => StatusKind::FailedPrecondition,
            Self::Cancelled => StatusKind::Cancelled,
            Self::DeadlineExceeded => StatusKind::DeadlineExceeded,
            Self::Internal(_) => StatusKind::Internal,
        }
    }

    /// Whether a client may usefully retry the operation.
    pub fn retryable(&self) -> bool {
        self.status().retryable()
    }
}

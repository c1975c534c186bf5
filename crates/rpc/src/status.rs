//! Maps engine errors onto wire statuses.
//!
//! Every failure carries its stable error code in the `aifs-reason`
//! metadata entry and a `aifs-retryable` hint, so clients can branch on
//! machine-readable tags instead of display strings.

use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

use aifs_types::error::{EngineError, ErrorCode, StatusKind};

/// Metadata key carrying the stable error code.
pub const REASON_KEY: &str = "aifs-reason";
/// Metadata key carrying the retryability hint.
pub const RETRYABLE_KEY: &str = "aifs-retryable";

fn code_for(kind: StatusKind) -> Code {
    match kind {
        StatusKind::Ok => Code::Ok,
        StatusKind::InvalidArgument => Code::InvalidArgument,
        StatusKind::NotFound => Code::NotFound,
        StatusKind::AlreadyExists => Code::AlreadyExists,
        StatusKind::FailedPrecondition => Code::FailedPrecondition,
        StatusKind::PermissionDenied => Code::PermissionDenied,
        StatusKind::Unauthenticated => Code::Unauthenticated,
        StatusKind::Aborted => Code::Aborted,
        StatusKind::Internal => Code::Internal,
        StatusKind::Unavailable => Code::Unavailable,
        StatusKind::DeadlineExceeded => Code::DeadlineExceeded,
        StatusKind::Cancelled => Code::Cancelled,
    }
}

/// Converts an engine error into the wire status.
pub fn to_status(err: &EngineError) -> Status {
    aifs_telemetry::error_metrics().inc_error(err.code());

    let mut status = Status::new(code_for(err.status()), err.to_string());
    if let Ok(reason) = MetadataValue::try_from(err.code()) {
        status.metadata_mut().insert(REASON_KEY, reason);
    }
    if let Ok(hint) = MetadataValue::try_from(if err.retryable() { "true" } else { "false" }) {
        status.metadata_mut().insert(RETRYABLE_KEY, hint);
    }
    status
}

/// Shorthand for `Result::map_err(to_status)` chains.
pub fn engine_err(err: EngineError) -> Status {
    to_status(&err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aifs_types::error::{AuthError, ChunkError, MetaError};
    use aifs_types::id::ChunkHash;

    #[test]
    fn codes_and_reasons_survive_mapping() {
        let status = to_status(&EngineError::Auth(AuthError::Expired(5)));
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(
            status.metadata().get(REASON_KEY).and_then(|v| v.to_str().ok()),
            Some("AUTH_TOKEN_EXPIRED")
        );

        let status = to_status(&EngineError::Meta(MetaError::AlreadyExists {
            entity: "tag",
            key: "prod/v1".into(),
        }));
        assert_eq!(status.code(), Code::AlreadyExists);

        let status = to_status(&EngineError::Chunk(ChunkError::Io(std::io::Error::other(
            "disk",
        ))));
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(
            status
                .metadata()
                .get(RETRYABLE_KEY)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );

        let status = to_status(&EngineError::NotVisible(aifs_types::id::AssetId([0; 32])));
        assert_eq!(status.code(), Code::NotFound);
    }
}

//! Timestamp helpers.
//!
//! Snapshot timestamps are part of the signed message and must therefore
//! have one canonical rendering: RFC 3339, UTC, second precision.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::MetaError;

/// Current time as Unix seconds.
pub fn now_unix() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

/// Renders Unix seconds as canonical RFC 3339 UTC with second precision,
/// e.g. `2026-08-01T12:00:00Z`.
pub fn to_rfc3339(unix_secs: u64) -> String {
    match OffsetDateTime::from_unix_timestamp(unix_secs as i64) {
        Ok(dt) => dt
            .replace_nanosecond(0)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string()),
        Err(_) => "1970-01-01T00:00:00Z".to_string(),
    }
}

/// Parses an RFC 3339 timestamp back into Unix seconds.
pub fn from_rfc3339(s: &str) -> Result<u64, MetaError> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map(|dt| dt.unix_timestamp().max(0) as u64)
        .map_err(|e| MetaError::Decode(format!("bad timestamp {s:?}: {e}")))
}

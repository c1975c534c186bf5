//! Embedding payloads.
//!
//! One protobuf message carries the f32 vector together with its model
//! provenance. The declared dimension MUST equal the vector length.

use prost::Message;
use std::collections::BTreeMap;

use aifs_types::error::CodecError;
use aifs_types::snapshot::DistanceKind;

/// The embed payload message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EmbedPayload {
    /// Name of the model that produced the vector.
    #[prost(string, tag = "1")]
    pub model_name: String,
    /// Declared dimension; must equal `vector.len()`.
    #[prost(uint32, tag = "2")]
    pub dimension: u32,
    /// Distance metric name: one of
    /// `cosine | euclidean | dot | manhattan | hamming`.
    #[prost(string, tag = "3")]
    pub distance_metric: String,
    /// Free-form generation parameters.
    #[prost(btree_map = "string, string", tag = "4")]
    pub parameters: BTreeMap<String, String>,
    /// The embedding components.
    #[prost(float, repeated, tag = "5")]
    pub vector: Vec<f32>,
}

impl EmbedPayload {
    /// Parses the declared metric name.
    pub fn metric(&self) -> Result<DistanceKind, CodecError> {
        DistanceKind::parse(&self.distance_metric).ok_or_else(|| CodecError::Malformed {
            kind: "embed",
            reason: format!("unknown distance metric {:?}", self.distance_metric),
        })
    }
}

/// Encodes an embed payload after validating it.
pub fn encode(payload: &EmbedPayload) -> Result<Vec<u8>, CodecError> {
    check(payload)?;
    Ok(payload.encode_to_vec())
}

/// Decodes without validating; use [`validate`] at trust boundaries.
pub fn decode(bytes: &[u8]) -> Result<EmbedPayload, CodecError> {
    EmbedPayload::decode(bytes).map_err(|e| CodecError::Malformed {
        kind: "embed",
        reason: e.to_string(),
    })
}

/// Decodes and validates, returning the parsed payload.
pub fn validate(bytes: &[u8]) -> Result<EmbedPayload, CodecError> {
    let payload = decode(bytes)?;
    check(&payload)?;
    Ok(payload)
}

fn check(payload: &EmbedPayload) -> Result<(), CodecError> {
    if payload.dimension as usize != payload.vector.len() {
        return Err(CodecError::DimensionMismatch {
            declared: payload.dimension,
            actual: payload.vector.len() as u32,
        });
    }
    if payload.dimension == 0 {
        return Err(CodecError::Malformed {
            kind: "embed",
            reason: "zero-dimensional embedding".to_string(),
        });
    }
    payload.metric()?;
    if payload.vector.iter().any(|c| !c.is_finite()) {
        return Err(CodecError::Malformed {
            kind: "embed",
            reason: "non-finite vector component".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> EmbedPayload {
        EmbedPayload {
            model_name: "all-MiniLM-L6-v2".to_string(),
            dimension: 3,
            distance_metric: "cosine".to_string(),
            parameters: BTreeMap::new(),
            vector: vec![0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn roundtrip() {
        let p = payload();
        let wire = encode(&p).unwrap();
        assert_eq!(validate(&wire).unwrap(), p);
        assert_eq!(p.metric().unwrap(), DistanceKind::Cosine);
    }

    #[test]
    fn dimension_must_match() {
        let mut p = payload();
        p.dimension = 4;
        assert!(matches!(
            encode(&p),
            Err(CodecError::DimensionMismatch { declared: 4, actual: 3 })
        ));
    }

    #[test]
    fn unknown_metric_rejected() {
        let mut p = payload();
        p.distance_metric = "chebyshev".to_string();
        assert!(encode(&p).is_err());
    }

    #[test]
    fn non_finite_rejected() {
        let mut p = payload();
        p.vector[1] = f32::INFINITY;
        assert!(encode(&p).is_err());
    }

    #[test]
    fn garbage_bytes_rejected() {
        assert!(validate(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}

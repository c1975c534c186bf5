//! The per-RPC capability guard.
//!
//! Tokens are bearer credentials in the `authorization` metadata entry
//! (`Bearer <base64-token>`). Absence yields `Unauthenticated`; a token
//! whose caveats do not admit the invoked method or namespace yields
//! `PermissionDenied`.

use tonic::metadata::MetadataMap;
use tonic::Status;

use aifs_auth::{Method, Token};
use aifs_engine::AifsEngine;
use aifs_types::error::{AuthError, EngineError};
use aifs_types::id::Namespace;
use aifs_types::timestamp::now_unix;

use crate::status::to_status;

fn extract_token(metadata: &MetadataMap) -> Result<Token, AuthError> {
    let raw = metadata
        .get("authorization")
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::Malformed("authorization header is not ASCII".to_string()))?;
    let encoded = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .ok_or_else(|| AuthError::Malformed("expected Bearer scheme".to_string()))?;
    Token::from_base64(encoded)
}

/// Verifies the caller's token against the invoked method family and
/// target namespace.
pub fn authorize(
    engine: &AifsEngine,
    metadata: &MetadataMap,
    method: Method,
    namespace: Option<&Namespace>,
) -> Result<Token, Status> {
    let token =
        extract_token(metadata).map_err(|e| to_status(&EngineError::Auth(e)))?;
    engine
        .verifier()
        .verify(&token, method, namespace, now_unix())
        .map_err(|e| to_status(&EngineError::Auth(e)))?;
    Ok(token)
}

/// Whether the caller's (already authorized) token carries the explicit
/// `admin` caveat, for overwrite-gated operations.
pub fn is_admin(engine: &AifsEngine, token: &Token) -> bool {
    engine.verifier().is_admin(token, now_unix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aifs_auth::Caveat;
    use aifs_engine::{EngineConfig, EngineOptions};
    use tonic::metadata::MetadataValue;

    fn engine() -> (tempfile::TempDir, AifsEngine) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            storage_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let engine = AifsEngine::open(config, EngineOptions::default()).unwrap();
        (dir, engine)
    }

    fn metadata_with(token: &Token) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        let value = format!("Bearer {}", token.to_base64().unwrap());
        metadata.insert("authorization", MetadataValue::try_from(value).unwrap());
        metadata
    }

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let (_dir, engine) = engine();
        let err = authorize(&engine, &MetadataMap::new(), Method::Get, None).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn caveated_token_gates_method_and_namespace() {
        let (_dir, engine) = engine();
        let token = engine
            .minter()
            .mint("reader")
            .attenuate(Caveat::Method(Method::Get))
            .attenuate(Caveat::Namespace(ns("ns1")));
        let metadata = metadata_with(&token);

        assert!(authorize(&engine, &metadata, Method::Get, Some(&ns("ns1"))).is_ok());

        let err = authorize(&engine, &metadata, Method::Put, Some(&ns("ns1"))).unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);

        let err = authorize(&engine, &metadata, Method::Get, Some(&ns("ns2"))).unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn expired_token_is_unauthenticated() {
        let (_dir, engine) = engine();
        let token = engine
            .minter()
            .mint("reader")
            .attenuate(Caveat::Method(Method::Get))
            .attenuate(Caveat::Expires(1));
        let metadata = metadata_with(&token);

        let err = authorize(&engine, &metadata, Method::Get, None).unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn admin_gate() {
        let (_dir, engine) = engine();
        let plain = engine.minter().mint("user");
        assert!(!is_admin(&engine, &plain));
        let admin = engine
            .minter()
            .mint("op")
            .attenuate(Caveat::Method(Method::Admin));
        assert!(is_admin(&engine, &admin));
    }
}

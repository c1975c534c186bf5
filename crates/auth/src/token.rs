use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use aifs_types::error::AuthError;
use aifs_types::id::Namespace;

type HmacSha256 = Hmac<Sha256>;

/// RPC method families a caveat can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Ingest operations.
    Put,
    /// Retrieval and listing operations.
    Get,
    /// Vector search.
    Search,
    /// Snapshot creation and verification.
    Snapshot,
    /// Branch pointer operations.
    Branch,
    /// Tag operations.
    Tag,
    /// Administrative operations; implies every other method.
    Admin,
}

impl Method {
    /// Stable lowercase name used in caveats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::Search => "search",
            Self::Snapshot => "snapshot",
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Admin => "admin",
        }
    }

    /// Parses a caveat method name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "put" => Some(Self::Put),
            "get" => Some(Self::Get),
            "search" => Some(Self::Search),
            "snapshot" => Some(Self::Snapshot),
            "branch" => Some(Self::Branch),
            "tag" => Some(Self::Tag),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A parsed first-party caveat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caveat {
    /// Restricts the token to one namespace.
    Namespace(Namespace),
    /// Allows one method family.
    Method(Method),
    /// Invalidates the token after the given epoch second.
    Expires(u64),
}

impl Caveat {
    /// Renders the caveat in its canonical `key = value` form.
    pub fn render(&self) -> String {
        match self {
            Self::Namespace(ns) => format!("namespace = {ns}"),
            Self::Method(m) => format!("method = {}", m.as_str()),
            Self::Expires(t) => format!("expires = {t}"),
        }
    }

    /// Parses the canonical form; unknown keys are an error so that
    /// verification fails closed on caveats this build cannot enforce.
    pub fn parse(s: &str) -> Result<Self, AuthError> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| AuthError::BadCaveat(s.to_string()))?;
        let (key, value) = (key.trim(), value.trim());
        match key {
            "namespace" => Namespace::new(value)
                .map(Self::Namespace)
                .map_err(|_| AuthError::BadCaveat(s.to_string())),
            "method" => Method::parse(value)
                .map(Self::Method)
                .ok_or_else(|| AuthError::BadCaveat(s.to_string())),
            "expires" => value
                .parse()
                .map(Self::Expires)
                .map_err(|_| AuthError::BadCaveat(s.to_string())),
            _ => Err(AuthError::BadCaveat(s.to_string())),
        }
    }
}

/// A bearer capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Hint for where the token is usable (informational).
    pub location: String,
    /// Public identifier chosen at mint time.
    pub identifier: String,
    /// First-party caveats, in signature-chain order.
    pub caveats: Vec<String>,
    /// HMAC-SHA256 over the caveat chain.
    pub sig: [u8; 32],
}

fn hmac(key: &[u8], message: &[u8]) -> [u8; 32] {
    // HMAC accepts keys of any length.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

impl Token {
    /// Appends a caveat, chaining the signature. Attenuation only ever
    /// narrows what the token grants.
    pub fn attenuate(mut self, caveat: Caveat) -> Self {
        let rendered = caveat.render();
        self.sig = hmac(&self.sig, rendered.as_bytes());
        self.caveats.push(rendered);
        self
    }

    /// Serializes to the URL-safe base64 wire form.
    pub fn to_base64(&self) -> Result<String, AuthError> {
        let raw = bincode::serialize(self).map_err(|e| AuthError::Malformed(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Parses the wire form.
    pub fn from_base64(s: &str) -> Result<Self, AuthError> {
        let raw = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        bincode::deserialize(&raw).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

/// Mints tokens under a server-held root secret.
pub struct TokenMinter {
    root_key: [u8; 32],
    location: String,
}

impl TokenMinter {
    /// Creates a minter. The root key is fixed for the engine lifetime.
    pub fn new(root_key: [u8; 32], location: impl Into<String>) -> Self {
        Self {
            root_key,
            location: location.into(),
        }
    }

    /// Mints an unrestricted token for `identifier`.
    pub fn mint(&self, identifier: impl Into<String>) -> Token {
        let identifier = identifier.into();
        Token {
            location: self.location.clone(),
            sig: hmac(&self.root_key, identifier.as_bytes()),
            identifier,
            caveats: Vec::new(),
        }
    }
}

/// The request context a token is checked against.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Method family the RPC belongs to.
    pub method: Method,
    /// Namespace the request targets, if it targets one.
    pub namespace: Option<&'a Namespace>,
    /// Current time, epoch seconds.
    pub now: u64,
}

/// Verifies tokens against the server root secret.
pub struct TokenVerifier {
    root_key: [u8; 32],
}

impl TokenVerifier {
    /// Creates a verifier sharing the minter's root key.
    pub fn new(root_key: [u8; 32]) -> Self {
        Self { root_key }
    }

    /// Checks the MAC chain and every caveat.
    ///
    /// Identity failures (forged MAC, expiry) surface as
    /// `Unauthenticated`-class errors; capability failures (method or
    /// namespace not granted) as `PermissionDenied`-class errors.
    pub fn verify(
        &self,
        token: &Token,
        method: Method,
        namespace: Option<&Namespace>,
        now: u64,
    ) -> Result<(), AuthError> {
        // 1. Recompute the signature chain.
        let mut sig = hmac(&self.root_key, token.identifier.as_bytes());
        for caveat in &token.caveats {
            sig = hmac(&sig, caveat.as_bytes());
        }
        let mut mac = HmacSha256::new_from_slice(&self.root_key)
            .map_err(|_| AuthError::MacMismatch)?;
        mac.update(&sig);
        let expected = {
            let mut check = HmacSha256::new_from_slice(&self.root_key)
                .map_err(|_| AuthError::MacMismatch)?;
            check.update(&token.sig);
            check.finalize().into_bytes()
        };
        // Compare through one more HMAC so the comparison is constant
        // time with respect to the chain value.
        mac.verify_slice(&expected).map_err(|_| AuthError::MacMismatch)?;

        // 2. Parse and enforce caveats.
        let mut allowed_methods: Vec<Method> = Vec::new();
        let mut allowed_namespaces: Vec<Namespace> = Vec::new();
        let mut expires: Option<u64> = None;
        for raw in &token.caveats {
            match Caveat::parse(raw)? {
                Caveat::Method(m) => allowed_methods.push(m),
                Caveat::Namespace(ns) => allowed_namespaces.push(ns),
                Caveat::Expires(t) => {
                    expires = Some(expires.map_or(t, |prev| prev.min(t)));
                }
            }
        }

        if let Some(deadline) = expires {
            if now > deadline {
                return Err(AuthError::Expired(deadline));
            }
        }

        if !allowed_methods.is_empty()
            && !allowed_methods.contains(&method)
            && !allowed_methods.contains(&Method::Admin)
        {
            return Err(AuthError::MethodNotAllowed(method.as_str().to_string()));
        }

        if let Some(ns) = namespace {
            if !allowed_namespaces.is_empty() && !allowed_namespaces.contains(ns) {
                return Err(AuthError::NamespaceNotAllowed(ns.to_string()));
            }
        }

        Ok(())
    }

    /// Whether the token grants the `admin` method (used to gate key
    /// overwrites and pruning).
    pub fn is_admin(&self, token: &Token, now: u64) -> bool {
        self.verify(token, Method::Admin, None, now).is_ok()
            && token
                .caveats
                .iter()
                .filter_map(|c| Caveat::parse(c).ok())
                .any(|c| c == Caveat::Method(Method::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    fn setup() -> (TokenMinter, TokenVerifier) {
        let key = [0x42; 32];
        (TokenMinter::new(key, "aifs"), TokenVerifier::new(key))
    }

    #[test]
    fn unrestricted_token_allows_everything() {
        let (minter, verifier) = setup();
        let token = minter.mint("ci-runner");
        assert!(verifier.verify(&token, Method::Put, Some(&ns("prod")), 100).is_ok());
        assert!(verifier.verify(&token, Method::Admin, None, 100).is_ok());
    }

    #[test]
    fn caveats_restrict_method_namespace_and_lifetime() {
        let (minter, verifier) = setup();
        let token = minter
            .mint("reader")
            .attenuate(Caveat::Method(Method::Get))
            .attenuate(Caveat::Namespace(ns("ns1")))
            .attenuate(Caveat::Expires(1_000));

        // Wrong method: capability failure.
        assert!(matches!(
            verifier.verify(&token, Method::Put, Some(&ns("ns1")), 100),
            Err(AuthError::MethodNotAllowed(_))
        ));
        // Wrong namespace: capability failure.
        assert!(matches!(
            verifier.verify(&token, Method::Get, Some(&ns("ns2")), 100),
            Err(AuthError::NamespaceNotAllowed(_))
        ));
        // Allowed combination before expiry.
        assert!(verifier.verify(&token, Method::Get, Some(&ns("ns1")), 100).is_ok());
        // After expiry: identity failure.
        assert!(matches!(
            verifier.verify(&token, Method::Get, Some(&ns("ns1")), 1_001),
            Err(AuthError::Expired(1_000))
        ));
    }

    #[test]
    fn tampering_breaks_the_mac() {
        let (minter, verifier) = setup();
        let token = minter.mint("writer").attenuate(Caveat::Method(Method::Get));

        // Upgrading the caveat without re-chaining fails.
        let mut forged = token.clone();
        forged.caveats[0] = Caveat::Method(Method::Admin).render();
        assert!(matches!(
            verifier.verify(&forged, Method::Admin, None, 0),
            Err(AuthError::MacMismatch)
        ));

        // Dropping a caveat fails.
        let mut stripped = token.clone();
        stripped.caveats.clear();
        assert!(matches!(
            verifier.verify(&stripped, Method::Put, None, 0),
            Err(AuthError::MacMismatch)
        ));

        // A different root key fails.
        let other = TokenVerifier::new([0x43; 32]);
        assert!(other.verify(&token, Method::Get, None, 0).is_err());
    }

    #[test]
    fn attenuation_narrows_but_never_widens() {
        let (minter, verifier) = setup();
        let token = minter.mint("svc").attenuate(Caveat::Method(Method::Get));
        assert!(verifier.verify(&token, Method::Get, None, 0).is_ok());

        // Holder appends a second method; both are now allowed, but the
        // chain still verifies because attenuation needs no root key.
        let widened = token.clone().attenuate(Caveat::Method(Method::Search));
        assert!(verifier.verify(&widened, Method::Search, None, 0).is_ok());
        assert!(verifier.verify(&widened, Method::Put, None, 0).is_err());

        // Expiry can only shrink: the minimum of all expires caveats wins.
        let short = token
            .clone()
            .attenuate(Caveat::Expires(50))
            .attenuate(Caveat::Expires(500));
        assert!(verifier.verify(&short, Method::Get, None, 51).is_err());
    }

    #[test]
    fn wire_roundtrip_and_malformed_input() {
        let (minter, verifier) = setup();
        let token = minter
            .mint("cli")
            .attenuate(Caveat::Namespace(ns("ns1")))
            .attenuate(Caveat::Expires(9_999));

        let wire = token.to_base64().unwrap();
        let parsed = Token::from_base64(&wire).unwrap();
        assert_eq!(parsed, token);
        assert!(verifier.verify(&parsed, Method::Get, Some(&ns("ns1")), 1).is_ok());

        assert!(Token::from_base64("not!base64!!").is_err());
        assert!(Token::from_base64("").is_err());
    }

    #[test]
    fn unknown_caveats_fail_closed() {
        let (minter, verifier) = setup();
        let mut token = minter.mint("svc");
        let rendered = "ip = 10.0.0.1".to_string();
        token.sig = {
            use hmac::Mac;
            let mut mac = HmacSha256::new_from_slice(&token.sig).unwrap();
            mac.update(rendered.as_bytes());
            mac.finalize().into_bytes().into()
        };
        token.caveats.push(rendered);
        assert!(matches!(
            verifier.verify(&token, Method::Get, None, 0),
            Err(AuthError::BadCaveat(_))
        ));
    }

    #[test]
    fn admin_gate_requires_explicit_admin_caveat() {
        let (minter, verifier) = setup();
        // An unrestricted token passes method checks but is not "admin"
        // for overwrite gating.
        let unrestricted = minter.mint("root");
        assert!(!verifier.is_admin(&unrestricted, 0));

        let admin = minter.mint("op").attenuate(Caveat::Method(Method::Admin));
        assert!(verifier.is_admin(&admin, 0));
    }
}

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

//! # AIFS capability tokens
//!
//! Macaroon-style bearer credentials. A token carries a location, an
//! identifier, a list of first-party caveats, and an HMAC-SHA256
//! signature chained over the caveat list:
//!
//! ```text
//! sig0 = HMAC(root_key, identifier)
//! sigN = HMAC(sigN-1, caveatN)
//! ```
//!
//! Anyone holding a token can attenuate it by appending caveats; only
//! the holder of the root key can mint or verify. Recognized caveats:
//! `namespace = N`, `method = M`, `expires = T` (epoch seconds).
//! Unrecognized caveats fail verification closed.

mod token;

pub use token::{Caveat, Method, Token, TokenMinter, TokenVerifier};

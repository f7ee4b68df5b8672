#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Authorization tokens for certflow.
//!
//! The client side only ever needs [`parse_unverified`]: the issuing
//! authority verifies the signature, the client reads the claims to route the
//! request and to cross-check identities. [`JwtSigner`] and [`JwtVerifier`]
//! back the in-process authority used for offline issuance and the key-file
//! authorization issuer.

mod claims;
mod error;
mod jti;
mod jwk;
mod signer;
mod unverified;
mod verifier;

pub use claims::{Audience, Claims};
pub use error::{JwtError, Result};
pub use jti::{InMemoryJtiStore, JtiStore};
pub use jwk::{Ed25519KeyPair, Ed25519PublicKey};
pub use signer::JwtSigner;
pub use unverified::{parse_unverified, ClaimsSource, TokenClaims};
pub use verifier::{JwtVerifier, VerificationOptions};

#[cfg(test)]
mod tests;

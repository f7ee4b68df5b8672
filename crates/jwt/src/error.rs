#![allow(clippy::module_name_repetitions)]

use thiserror::Error;

/// Result type for token operations.
pub type Result<T> = std::result::Result<T, JwtError>;

/// Token errors.
#[derive(Debug, Error)]
pub enum JwtError {
    /// JSON (de)serialization failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Signature verification failed.
    #[error("signature verification failed")]
    Signature,
    /// Unsupported signing algorithm.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// `kid` is not known to the verifier.
    #[error("unknown key id: {0}")]
    UnknownKey(String),
    /// `kid` missing while several keys are configured.
    #[error("missing key id")]
    MissingKeyId,
    /// Token expired.
    #[error("token expired")]
    Expired,
    /// Token not valid yet.
    #[error("token not yet valid")]
    NotYetValid,
    /// `iat` lies in the future.
    #[error("token issued in the future")]
    IssuedInFuture,
    /// A claim has an invalid value.
    #[error("invalid claim {0}: {1}")]
    InvalidClaim(&'static str, &'static str),
    /// A claim does not match the expected value.
    #[error("claim mismatch: {0}")]
    ClaimMismatch(&'static str),
    /// `jti` is required.
    #[error("jti claim missing")]
    MissingJti,
    /// JTI store failure.
    #[error("jti store error: {0}")]
    JtiStore(&'static str),
    /// Token was already consumed.
    #[error("jti replay detected")]
    Replay,
    /// Token is not a compact JWS.
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    /// Key material could not be decoded.
    #[error("invalid key material: {0}")]
    Key(String),
    /// Time conversion failed.
    #[error("time conversion error")]
    TimeConversion,
}

impl From<std::time::SystemTimeError> for JwtError {
    fn from(_: std::time::SystemTimeError) -> Self {
        Self::TimeConversion
    }
}

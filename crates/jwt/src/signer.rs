use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::Signer as _;
use serde::Serialize;
use serde_json::json;

use crate::claims::Claims;
use crate::error::Result;
use crate::jwk::Ed25519KeyPair;

/// EdDSA token signer.
#[derive(Clone)]
pub struct JwtSigner {
    key: Ed25519KeyPair,
}

impl JwtSigner {
    #[allow(clippy::missing_const_for_fn)]
    #[must_use]
    pub fn new(key: Ed25519KeyPair) -> Self {
        Self { key }
    }

    /// Key id written into the header.
    #[must_use]
    pub fn kid(&self) -> &str {
        self.key.kid()
    }

    /// Signs the claims into a compact JWS, assigning a `jti` when absent.
    ///
    /// # Errors
    ///
    /// Returns `JwtError` when the time claims are inconsistent or serialization fails.
    pub fn sign(&self, claims: &mut Claims) -> Result<String> {
        claims.ensure_jwt_id();
        claims.validate_temporal_consistency()?;
        let header = json!({
            "alg": "EdDSA",
            "typ": "JWT",
            "kid": self.key.kid(),
        });
        let header_encoded = encode_part(&header)?;
        let payload_encoded = encode_part(claims)?;
        let signing_input = format!("{header_encoded}.{payload_encoded}");
        let signature = self
            .key
            .signing_key()
            .sign(signing_input.as_bytes())
            .to_bytes();
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

fn encode_part<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

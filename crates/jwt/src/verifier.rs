use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier as _};
use serde::Deserialize;

use crate::claims::Claims;
use crate::error::{JwtError, Result};
use crate::jti::JtiStore;
use crate::jwk::Ed25519PublicKey;

/// EdDSA token verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    keys: HashMap<String, Ed25519PublicKey>,
    default_kid: Option<String>,
    store: Option<Arc<dyn JtiStore>>,
    leeway: Duration,
}

impl JwtVerifier {
    #[must_use]
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Ed25519PublicKey>,
    {
        let mut map = HashMap::new();
        let mut default_kid = None;
        for key in keys {
            default_kid.get_or_insert_with(|| key.kid().to_owned());
            map.insert(key.kid().to_owned(), key);
        }
        Self {
            keys: map,
            default_kid,
            store: None,
            leeway: Duration::from_secs(30),
        }
    }

    /// Attaches a replay store; every verified `jti` is recorded.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_store(mut self, store: Arc<dyn JtiStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verifies signature and claims, returning the claim set.
    ///
    /// # Errors
    ///
    /// Returns `JwtError` when the signature, a claim check or the replay store rejects the token.
    pub fn verify(&self, token: &str, options: &VerificationOptions) -> Result<Claims> {
        let mut segments = token.trim().split('.');
        let header_part = segments.next().ok_or(JwtError::Malformed("missing header"))?;
        let payload_part = segments
            .next()
            .ok_or(JwtError::Malformed("missing payload"))?;
        let signature_part = segments
            .next()
            .ok_or(JwtError::Malformed("missing signature"))?;
        if segments.next().is_some() {
            return Err(JwtError::Malformed("too many segments"));
        }

        let header_raw = URL_SAFE_NO_PAD
            .decode(header_part)
            .map_err(|_| JwtError::Malformed("segment is not base64url"))?;
        let payload_raw = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| JwtError::Malformed("segment is not base64url"))?;
        let signature_raw = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_| JwtError::Malformed("segment is not base64url"))?;

        let header: Header = serde_json::from_slice(&header_raw)?;
        if header.alg != "EdDSA" {
            return Err(JwtError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .or_else(|| self.default_kid.clone())
            .ok_or(JwtError::MissingKeyId)?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| JwtError::UnknownKey(kid.clone()))?;
        let signing_input = format!("{header_part}.{payload_part}");
        let signature = Signature::from_slice(&signature_raw).map_err(|_| JwtError::Signature)?;
        key.verifying_key()
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| JwtError::Signature)?;

        let claims: Claims = serde_json::from_slice(&payload_raw)?;
        self.validate_claims(&claims, options)?;

        let jti = claims.jwt_id.as_deref();
        if options.require_jti && jti.is_none() {
            return Err(JwtError::MissingJti);
        }
        match (&self.store, jti) {
            (Some(store), Some(jti_value)) => {
                if !store.check_and_insert(jti_value, claims.expiration)? {
                    return Err(JwtError::Replay);
                }
            }
            (None, _) if options.require_jti => {
                return Err(JwtError::JtiStore("no replay store configured"));
            }
            _ => {}
        }
        Ok(claims)
    }

    fn validate_claims(&self, claims: &Claims, options: &VerificationOptions) -> Result<()> {
        let now = options.now.unwrap_or_else(SystemTime::now);
        let leeway = self.leeway;
        claims.validate_temporal_consistency()?;
        if let Some(exp) = claims.expiration {
            if now
                .duration_since(exp)
                .map(|elapsed| elapsed > leeway)
                .unwrap_or(false)
            {
                return Err(JwtError::Expired);
            }
        } else if options.require_expiration {
            return Err(JwtError::InvalidClaim("exp", "expiration is required"));
        }
        if let Some(nbf) = claims.not_before {
            if nbf
                .duration_since(now)
                .map(|delta| delta > leeway)
                .unwrap_or(false)
            {
                return Err(JwtError::NotYetValid);
            }
        }
        if let Some(iat) = claims.issued_at {
            if iat
                .duration_since(now)
                .map(|delta| delta > leeway)
                .unwrap_or(false)
            {
                return Err(JwtError::IssuedInFuture);
            }
        }
        if let Some(expected) = &options.issuer {
            if claims.issuer.as_deref() != Some(expected.as_str()) {
                return Err(JwtError::ClaimMismatch("iss"));
            }
        }
        if let Some(expected) = &options.subject {
            if claims.subject.as_deref() != Some(expected.as_str()) {
                return Err(JwtError::ClaimMismatch("sub"));
            }
        }
        if let Some(expected_aud) = &options.audience {
            match &claims.audience {
                Some(audience) if audience.contains(expected_aud) => {}
                _ => return Err(JwtError::ClaimMismatch("aud")),
            }
        }
        Ok(())
    }
}

/// Verification options.
#[derive(Debug, Clone)]
pub struct VerificationOptions {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub require_jti: bool,
    pub require_expiration: bool,
    pub now: Option<SystemTime>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            subject: None,
            audience: None,
            require_jti: true,
            require_expiration: true,
            now: None,
        }
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
    kid: Option<String>,
}

use std::time::SystemTime;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::claims::Claims;
use crate::error::{JwtError, Result};

/// Identity claims of an authorization token, read without verifying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// `sub`
    pub subject: String,
    /// `aud` in declaration order.
    pub audience: Vec<String>,
    /// `sha` pin of the authority root certificate.
    pub root_fingerprint: Option<String>,
    /// `sans` authorized by the token.
    pub sans: Vec<String>,
    /// `iss`
    pub issuer: Option<String>,
    /// `exp`
    pub expiration: Option<SystemTime>,
    /// `jti`
    pub jwt_id: Option<String>,
}

impl TokenClaims {
    /// Non-empty root fingerprint, if any.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.root_fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|sha| !sha.is_empty())
    }

    /// First audience entry.
    #[must_use]
    pub fn first_audience(&self) -> Option<&str> {
        self.audience.first().map(String::as_str)
    }

    /// Names a request under this token must carry: `sans`, or the subject alone.
    #[must_use]
    pub fn requested_names(&self) -> Vec<String> {
        if self.sans.is_empty() {
            vec![self.subject.clone()]
        } else {
            self.sans.clone()
        }
    }
}

impl TryFrom<Claims> for TokenClaims {
    type Error = JwtError;

    fn try_from(claims: Claims) -> Result<Self> {
        let subject = claims
            .subject
            .filter(|sub| !sub.trim().is_empty())
            .ok_or(JwtError::InvalidClaim("sub", "subject is required"))?;
        Ok(Self {
            subject,
            audience: claims.audience.map(|aud| aud.to_vec()).unwrap_or_default(),
            root_fingerprint: claims.root_fingerprint,
            sans: claims.sans,
            issuer: claims.issuer,
            expiration: claims.expiration,
            jwt_id: claims.jwt_id,
        })
    }
}

/// Something that can yield token claims.
pub trait ClaimsSource {
    /// Extracts the claims.
    ///
    /// # Errors
    ///
    /// Returns `JwtError` when the source is not a well-formed token.
    fn parse_claims(&self) -> Result<TokenClaims>;
}

impl ClaimsSource for str {
    fn parse_claims(&self) -> Result<TokenClaims> {
        parse_unverified(self)
    }
}

impl ClaimsSource for String {
    fn parse_claims(&self) -> Result<TokenClaims> {
        parse_unverified(self)
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Reads the claims of a compact JWS without checking its signature.
///
/// Only the authority can verify the token; the values returned here are
/// suitable for routing and cross-checks, never for trust decisions on their own.
///
/// # Errors
///
/// Returns `JwtError::Malformed` when the token is not three non-empty base64url
/// segments with a JSON object header and payload, and `JwtError::InvalidClaim`
/// when `sub` is missing.
pub fn parse_unverified(token: &str) -> Result<TokenClaims> {
    let token = token.trim();
    let mut segments = token.split('.');
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
    if header_part.is_empty() || payload_part.is_empty() || signature_part.is_empty() {
        return Err(JwtError::Malformed("empty segment"));
    }

    let header_raw = decode_segment(header_part)?;
    let payload_raw = decode_segment(payload_part)?;
    decode_segment(signature_part)?;

    let header: Map<String, Value> =
        serde_json::from_slice(&header_raw).map_err(|_| JwtError::Malformed("header is not JSON"))?;
    let header: Header = serde_json::from_value(Value::Object(header))
        .map_err(|_| JwtError::Malformed("header has no alg"))?;
    if header.alg.eq_ignore_ascii_case("none") {
        return Err(JwtError::UnsupportedAlgorithm(header.alg));
    }

    let claims: Claims = serde_json::from_slice(&payload_raw)
        .map_err(|_| JwtError::Malformed("payload is not a claim set"))?;
    TokenClaims::try_from(claims)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| JwtError::Malformed("segment is not base64url"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("json"))
    }

    fn token_with(payload: &Value) -> String {
        format!(
            "{}.{}.{}",
            encode(&json!({"alg": "ES256", "kid": "abc"})),
            encode(payload),
            URL_SAFE_NO_PAD.encode(b"not-a-real-signature")
        )
    }

    #[test]
    fn extracts_routing_claims() {
        let token = token_with(&json!({
            "sub": "internal.example.com",
            "aud": ["https://ca.internal:9000/1.0/sign"],
            "sha": "0a1b2c",
            "sans": ["internal.example.com", "10.0.0.1"],
            "iss": "admin@example.com",
            "exp": 2_000_000_000_u64,
            "jti": "j-1",
        }));
        let claims = parse_unverified(&token).expect("claims");
        assert_eq!(claims.subject, "internal.example.com");
        assert_eq!(
            claims.audience,
            vec!["https://ca.internal:9000/1.0/sign".to_string()]
        );
        assert_eq!(claims.fingerprint(), Some("0a1b2c"));
        assert_eq!(claims.sans.len(), 2);
        assert_eq!(claims.issuer.as_deref(), Some("admin@example.com"));
        assert_eq!(claims.jwt_id.as_deref(), Some("j-1"));
    }

    #[test]
    fn parsing_is_repeatable() {
        let token = token_with(&json!({"sub": "a", "aud": "https://ca/sign", "sha": "ff"}));
        let first = token.parse_claims().expect("first");
        let second = token.as_str().parse_claims().expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn requested_names_fall_back_to_subject() {
        let bare = parse_unverified(&token_with(&json!({"sub": "foobar"}))).expect("claims");
        assert_eq!(bare.requested_names(), vec!["foobar".to_string()]);
        assert!(bare.fingerprint().is_none());
        assert!(bare.first_audience().is_none());

        let with_sans = parse_unverified(&token_with(
            &json!({"sub": "foobar", "sans": ["1.1.1.1", "hello.example.com"]}),
        ))
        .expect("claims");
        assert_eq!(
            with_sans.requested_names(),
            vec!["1.1.1.1".to_string(), "hello.example.com".to_string()]
        );
    }

    #[test]
    fn blank_fingerprint_is_ignored() {
        let claims =
            parse_unverified(&token_with(&json!({"sub": "a", "sha": "  "}))).expect("claims");
        assert!(claims.fingerprint().is_none());
    }

    #[test]
    fn rejects_malformed_tokens() {
        for token in ["", "abc", "a.b", "a.b.c.d", "..", "!!!.e30.c2ln"] {
            let err = parse_unverified(token).expect_err("malformed");
            assert!(matches!(err, JwtError::Malformed(_)), "{token}: {err}");
        }
        let not_json = format!(
            "{}.{}.{}",
            encode(&json!({"alg": "EdDSA"})),
            URL_SAFE_NO_PAD.encode(b"not json"),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        assert!(matches!(
            parse_unverified(&not_json),
            Err(JwtError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_subject() {
        let err = parse_unverified(&token_with(&json!({"aud": "https://ca"}))).expect_err("sub");
        assert!(matches!(err, JwtError::InvalidClaim("sub", _)));
    }

    #[test]
    fn rejects_unsigned_tokens() {
        let token = format!(
            "{}.{}.{}",
            encode(&json!({"alg": "none"})),
            encode(&json!({"sub": "a"})),
            URL_SAFE_NO_PAD.encode(b"x")
        );
        assert!(matches!(
            parse_unverified(&token),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
    }
}

#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JwtError, Result};

/// JWT `aud` may carry a single value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single target.
    Single(String),
    /// Ordered list of targets.
    Multiple(Vec<String>),
}

impl Audience {
    /// Checks whether `candidate` is one of the targets.
    #[must_use]
    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            Self::Single(aud) => aud == candidate,
            Self::Multiple(list) => list.iter().any(|aud| aud == candidate),
        }
    }

    /// First target in declaration order.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(aud) => Some(aud.as_str()),
            Self::Multiple(list) => list.first().map(String::as_str),
        }
    }

    /// Targets as an ordered list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(aud) => vec![aud.clone()],
            Self::Multiple(list) => list.clone(),
        }
    }
}

/// JWT claim set used by authorization tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// `iss`
    #[serde(skip_serializing_if = "Option::is_none", rename = "iss")]
    pub issuer: Option<String>,
    /// `sub`
    #[serde(skip_serializing_if = "Option::is_none", rename = "sub")]
    pub subject: Option<String>,
    /// `aud`
    #[serde(skip_serializing_if = "Option::is_none", rename = "aud")]
    pub audience: Option<Audience>,
    /// `exp`
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "serde_opt_timestamp",
        rename = "exp"
    )]
    pub expiration: Option<SystemTime>,
    /// `nbf`
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "serde_opt_timestamp",
        rename = "nbf"
    )]
    pub not_before: Option<SystemTime>,
    /// `iat`
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "serde_opt_timestamp",
        rename = "iat"
    )]
    pub issued_at: Option<SystemTime>,
    /// `jti`
    #[serde(skip_serializing_if = "Option::is_none", rename = "jti")]
    pub jwt_id: Option<String>,
    /// `sha`: hex SHA-256 of the authority root certificate.
    #[serde(skip_serializing_if = "Option::is_none", rename = "sha")]
    pub root_fingerprint: Option<String>,
    /// `sans`: names the token authorizes.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sans: Vec<String>,
    /// Remaining claims.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Claims {
    /// Empty claim set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issuer: None,
            subject: None,
            audience: None,
            expiration: None,
            not_before: None,
            issued_at: None,
            jwt_id: None,
            root_fingerprint: None,
            sans: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Fills `jti` with 16 random bytes when absent.
    pub fn ensure_jwt_id(&mut self) {
        if self.jwt_id.is_none() {
            let mut buf = [0_u8; 16];
            OsRng.fill_bytes(&mut buf);
            self.jwt_id = Some(hex::encode(buf));
        }
    }

    /// Checks ordering of the time claims.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidClaim` when `exp` precedes `nbf` or `iat`, or
    /// when `nbf` precedes `iat`.
    pub fn validate_temporal_consistency(&self) -> Result<()> {
        if let (Some(exp), Some(nbf)) = (self.expiration, self.not_before) {
            if exp < nbf {
                return Err(JwtError::InvalidClaim(
                    "exp",
                    "expiration must be after not_before",
                ));
            }
        }
        if let (Some(exp), Some(iat)) = (self.expiration, self.issued_at) {
            if exp < iat {
                return Err(JwtError::InvalidClaim(
                    "exp",
                    "expiration must be after issued_at",
                ));
            }
        }
        if let (Some(nbf), Some(iat)) = (self.not_before, self.issued_at) {
            if nbf < iat {
                return Err(JwtError::InvalidClaim(
                    "nbf",
                    "not_before must be after issued_at",
                ));
            }
        }
        Ok(())
    }

    /// Sets `iat` and `nbf` to now.
    pub fn set_issued_now(&mut self) {
        let now = truncate_to_seconds(SystemTime::now());
        self.issued_at = Some(now);
        self.not_before = Some(now);
    }

    /// Sets `exp` to now plus `ttl`.
    pub fn set_expiration_from_now(&mut self, ttl: Duration) {
        self.expiration = Some(truncate_to_seconds(SystemTime::now()) + ttl);
    }
}

impl Default for Claims {
    fn default() -> Self {
        Self::new()
    }
}

// Claims travel as whole seconds; keep in-memory values comparable with decoded ones.
fn truncate_to_seconds(value: SystemTime) -> SystemTime {
    value
        .duration_since(UNIX_EPOCH)
        .map_or(value, |elapsed| UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()))
}

/// `SystemTime` <-> unix seconds.
mod serde_opt_timestamp {
    use super::{Duration, SystemTime, UNIX_EPOCH};
    use std::convert::TryFrom;
    use thiserror::Error;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(
        value: &Option<SystemTime>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match value {
            Some(ts) => {
                serializer.serialize_some(&to_unix_seconds(*ts).map_err(serde::ser::Error::custom)?)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<SystemTime>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let opt: Option<i64> = serde::Deserialize::deserialize(deserializer)?;
        opt.map(from_unix_seconds)
            .transpose()
            .map_err(serde::de::Error::custom)
    }

    fn to_unix_seconds(value: SystemTime) -> std::result::Result<i64, TimeError> {
        let secs = value.duration_since(UNIX_EPOCH)?.as_secs();
        i64::try_from(secs).map_err(|_| TimeError::Overflow)
    }

    fn from_unix_seconds(value: i64) -> std::result::Result<SystemTime, TimeError> {
        let secs = u64::try_from(value).map_err(|_| TimeError::BeforeEpoch)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[derive(Debug, Error)]
    enum TimeError {
        #[error("timestamp before unix epoch")]
        BeforeEpoch,
        #[error("system time error: {0}")]
        SystemTime(#[from] std::time::SystemTimeError),
        #[error("timestamp overflow")]
        Overflow,
    }
}

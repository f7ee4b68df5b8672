//! Offline issuance against an in-process authority.
//!
//! The authority is built from a local JSON configuration holding the root
//! and issuer certificates and the issuer key. It mints its own single-use
//! token, signs with the issuer key and never opens a network connection.
//!
//! [`OfflineIssuance`] walks the stages in order:
//!
//! ```text
//! Uninitialized -> ConfigLoaded -> TokenGenerated -> CsrBuilt -> Signed -> Persisted
//! ```
//!
//! Each transition consumes the previous stage, so a stage can neither be
//! skipped nor repeated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use certflow_jwt::{
    Audience, Claims, Ed25519KeyPair, InMemoryJtiStore, JwtSigner, JwtVerifier,
    VerificationOptions,
};
use certflow_x509::ca::{sign_csr, SignCsrParams};
use certflow_x509::{parse_certificate_pem, parse_csr_pem, pem_fingerprint, SubjectAltName};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

use crate::client::{submit, IssuedCertificate};
use crate::error::{IssuanceError, Result};
use crate::request::{self, BuiltRequest};
use crate::storage::{CertificateBundle, LocalStorage, StorageOutcome};
use crate::transport::{AuthorityTransport, SignRequest, SignResponse};
use crate::validity::{format_rfc3339, parse_duration, Validity};

const PROVISIONER: &str = "offline";
const TOKEN_LIFETIME: StdDuration = StdDuration::from_secs(5 * 60);
const DEFAULT_CERT_DURATION: &str = "24h";
const MAX_CERT_DURATION: &str = "720h";
const MIN_CERT_DURATION: &str = "5m";

/// Authority configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
    /// Root certificate PEM.
    pub root: PathBuf,
    /// Issuing certificate PEM.
    pub crt: PathBuf,
    /// Issuing private key PEM.
    pub key: PathBuf,
    /// Listen address, used only for the token audience port.
    #[serde(default)]
    pub address: String,
    #[serde(rename = "dnsNames", default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub authority: AuthorityConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default)]
    pub claims: DurationClaims,
}

/// Certificate lifetime bounds as duration strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DurationClaims {
    #[serde(rename = "defaultTLSCertDuration")]
    pub default_tls_cert_duration: Option<String>,
    #[serde(rename = "maxTLSCertDuration")]
    pub max_tls_cert_duration: Option<String>,
    #[serde(rename = "minTLSCertDuration")]
    pub min_tls_cert_duration: Option<String>,
}

impl OfflineConfig {
    /// Reads the configuration; relative paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` when the file cannot be read or
    /// is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            IssuanceError::Configuration(format!("error reading {}: {err}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|err| {
            IssuanceError::Configuration(format!("error parsing {}: {err}", path.display()))
        })?;
        if let Some(base) = path.parent() {
            for file in [&mut config.root, &mut config.crt, &mut config.key] {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        Ok(config)
    }

    /// `https://{dnsNames[0]}[:port]/1.0/sign`
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` when `dnsNames` is empty.
    pub fn audience(&self) -> Result<String> {
        let host = self
            .dns_names
            .iter()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .ok_or_else(|| {
                IssuanceError::Configuration("offline configuration has no dnsNames".to_owned())
            })?;
        let port = self
            .address
            .rsplit_once(':')
            .map(|(_, port)| port.trim())
            .filter(|port| !port.is_empty() && *port != "443");
        Ok(match port {
            Some(port) => format!("https://{host}:{port}/1.0/sign"),
            None => format!("https://{host}/1.0/sign"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DurationBounds {
    default: Duration,
    min: Duration,
    max: Duration,
}

impl DurationBounds {
    fn from_claims(claims: &DurationClaims) -> Result<Self> {
        let parse = |name: &str, value: Option<&String>, fallback: &str| {
            let raw = value.map_or(fallback, String::as_str);
            parse_duration(raw).map_err(|reason| {
                IssuanceError::Configuration(format!("invalid {name} '{raw}': {reason}"))
            })
        };
        let bounds = Self {
            default: parse(
                "defaultTLSCertDuration",
                claims.default_tls_cert_duration.as_ref(),
                DEFAULT_CERT_DURATION,
            )?,
            min: parse(
                "minTLSCertDuration",
                claims.min_tls_cert_duration.as_ref(),
                MIN_CERT_DURATION,
            )?,
            max: parse(
                "maxTLSCertDuration",
                claims.max_tls_cert_duration.as_ref(),
                MAX_CERT_DURATION,
            )?,
        };
        if bounds.min > bounds.max || bounds.default < bounds.min || bounds.default > bounds.max {
            return Err(IssuanceError::Configuration(
                "certificate durations must satisfy min <= default <= max".to_owned(),
            ));
        }
        Ok(bounds)
    }
}

/// Authority that signs locally with the configured issuer key.
pub struct OfflineAuthority {
    issuer_cert_pem: String,
    issuer_key_pem: Zeroizing<String>,
    root_fingerprint: String,
    audience: String,
    bounds: DurationBounds,
    signer: JwtSigner,
    verifier: JwtVerifier,
}

impl std::fmt::Debug for OfflineAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineAuthority")
            .field("audience", &self.audience)
            .field("root_fingerprint", &self.root_fingerprint)
            .finish_non_exhaustive()
    }
}

impl OfflineAuthority {
    /// Loads certificates and key and mints a fresh provisioner key.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` for unreadable or invalid
    /// material.
    pub fn from_config(config: &OfflineConfig) -> Result<Self> {
        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|err| {
                IssuanceError::Configuration(format!("error reading {}: {err}", path.display()))
            })
        };
        let invalid = |path: &Path, err: &dyn std::fmt::Display| {
            IssuanceError::Configuration(format!("error parsing {}: {err}", path.display()))
        };

        let root_pem = read(&config.root)?;
        let root_fingerprint =
            pem_fingerprint(&root_pem).map_err(|err| invalid(&config.root, &err))?;
        let issuer_cert_pem = read(&config.crt)?;
        parse_certificate_pem(&issuer_cert_pem).map_err(|err| invalid(&config.crt, &err))?;
        let issuer_key_pem = Zeroizing::new(read(&config.key)?);
        let audience = config.audience()?;
        let bounds = DurationBounds::from_claims(&config.authority.claims)?;

        let provisioner = Ed25519KeyPair::generate(PROVISIONER).map_err(|err| {
            IssuanceError::Configuration(format!("error generating provisioner key: {err}"))
        })?;
        let verifier = JwtVerifier::new([provisioner.public_key()])
            .with_store(Arc::new(InMemoryJtiStore::default()));
        tracing::debug!(%audience, fingerprint = %root_fingerprint, "offline authority ready");
        Ok(Self {
            issuer_cert_pem,
            issuer_key_pem,
            root_fingerprint,
            audience,
            bounds,
            signer: JwtSigner::new(provisioner),
            verifier,
        })
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn root_fingerprint(&self) -> &str {
        &self.root_fingerprint
    }

    /// Mints a short-lived token authorizing `subject` as its only name.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::InvalidOptionValue` for an empty subject and
    /// `IssuanceError::TokenParse` when signing fails.
    pub fn generate_token(&self, subject: &str) -> Result<String> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(IssuanceError::invalid_option(
                "subject",
                subject,
                "subject must not be empty",
            ));
        }
        let mut claims = Claims::new();
        claims.issuer = Some(PROVISIONER.to_owned());
        claims.subject = Some(subject.to_owned());
        claims.audience = Some(Audience::Single(self.audience.clone()));
        claims.root_fingerprint = Some(self.root_fingerprint.clone());
        claims.sans = vec![subject.to_owned()];
        claims.set_issued_now();
        claims.set_expiration_from_now(TOKEN_LIFETIME);
        Ok(self.signer.sign(&mut claims)?)
    }

    fn window(
        &self,
        requested: Validity,
        now: OffsetDateTime,
    ) -> Result<(OffsetDateTime, OffsetDateTime)> {
        let not_before = requested.not_before.unwrap_or(now);
        let not_after = requested
            .not_after
            .unwrap_or(not_before + self.bounds.default);
        let duration = not_after - not_before;
        if duration < self.bounds.min {
            return Err(reject(
                400,
                format!(
                    "requested duration of {duration} is less than the authorized minimum certificate duration of {}",
                    self.bounds.min
                ),
            ));
        }
        if duration > self.bounds.max {
            return Err(reject(
                400,
                format!(
                    "requested duration of {duration} is more than the authorized maximum certificate duration of {}",
                    self.bounds.max
                ),
            ));
        }
        Ok((not_before, not_after))
    }
}

impl AuthorityTransport for OfflineAuthority {
    fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        let options = VerificationOptions {
            issuer: Some(PROVISIONER.to_owned()),
            audience: Some(self.audience.clone()),
            ..VerificationOptions::default()
        };
        let claims = self
            .verifier
            .verify(&request.ott, &options)
            .map_err(|err| reject(401, format!("authorization token rejected: {err}")))?;
        let subject = claims.subject.unwrap_or_default();

        let csr = parse_csr_pem(&request.csr)
            .map_err(|err| reject(400, format!("invalid certificate request: {err}")))?;
        if subject.to_lowercase() != csr.common_name.to_lowercase() {
            return Err(reject(
                401,
                format!(
                    "token subject '{subject}' and CSR CommonName '{}' do not match",
                    csr.common_name
                ),
            ));
        }
        let authorized: Vec<String> = if claims.sans.is_empty() {
            vec![subject.to_lowercase()]
        } else {
            claims.sans.iter().map(|san| san.to_lowercase()).collect()
        };
        if let Some(extra) = csr
            .sans
            .iter()
            .map(SubjectAltName::to_string)
            .find(|san| !authorized.contains(&san.to_lowercase()))
        {
            return Err(reject(
                401,
                format!("certificate request contains unauthorized name '{extra}'"),
            ));
        }

        let (not_before, not_after) =
            self.window(request.validity(), OffsetDateTime::now_utc())?;
        let crt = sign_csr(&SignCsrParams {
            csr_pem: &request.csr,
            issuer_cert_pem: &self.issuer_cert_pem,
            issuer_key_pem: &self.issuer_key_pem,
            not_before,
            not_after,
        })
        .map_err(|err| reject(500, format!("error signing certificate: {err}")))?;
        tracing::info!(
            subject = %csr.common_name,
            not_before = %format_rfc3339(not_before),
            not_after = %format_rfc3339(not_after),
            "offline authority signed certificate"
        );
        Ok(SignResponse {
            cert_chain: vec![crt.clone(), self.issuer_cert_pem.clone()],
            crt,
            ca: self.issuer_cert_pem.clone(),
        })
    }
}

fn reject(status: u16, message: String) -> IssuanceError {
    IssuanceError::AuthorityRejection { status, message }
}

/// Position of an [`OfflineIssuance`] in its stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineStage {
    Uninitialized,
    ConfigLoaded,
    TokenGenerated,
    CsrBuilt,
    Signed,
    Persisted,
}

/// Marker for a stage of [`OfflineIssuance`].
pub trait Stage {
    const STAGE: OfflineStage;
}

#[derive(Debug)]
pub struct Uninitialized {
    config_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ConfigLoaded {
    authority: OfflineAuthority,
}

#[derive(Debug)]
pub struct TokenGenerated {
    authority: OfflineAuthority,
    token: String,
}

#[derive(Debug)]
pub struct CsrBuilt {
    authority: OfflineAuthority,
    token: String,
    request: BuiltRequest,
}

#[derive(Debug)]
pub struct Signed {
    bundle: CertificateBundle,
}

#[derive(Debug)]
pub struct Persisted {
    outcome: StorageOutcome,
}

impl Stage for Uninitialized {
    const STAGE: OfflineStage = OfflineStage::Uninitialized;
}
impl Stage for ConfigLoaded {
    const STAGE: OfflineStage = OfflineStage::ConfigLoaded;
}
impl Stage for TokenGenerated {
    const STAGE: OfflineStage = OfflineStage::TokenGenerated;
}
impl Stage for CsrBuilt {
    const STAGE: OfflineStage = OfflineStage::CsrBuilt;
}
impl Stage for Signed {
    const STAGE: OfflineStage = OfflineStage::Signed;
}
impl Stage for Persisted {
    const STAGE: OfflineStage = OfflineStage::Persisted;
}

/// One offline issuance, advanced stage by stage.
#[derive(Debug)]
pub struct OfflineIssuance<S> {
    state: S,
}

impl<S: Stage> OfflineIssuance<S> {
    #[must_use]
    pub const fn stage(&self) -> OfflineStage {
        S::STAGE
    }
}

impl OfflineIssuance<Uninitialized> {
    #[must_use]
    pub const fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            state: Uninitialized { config_path },
        }
    }

    /// The configuration file to load.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::InvalidOptionValue` when no path was given.
    pub fn config_path(&self) -> Result<&Path> {
        self.state
            .config_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| {
                IssuanceError::invalid_option(
                    "ca-config",
                    "",
                    "offline mode requires a CA configuration file",
                )
            })
    }

    /// Loads the configuration and starts the in-process authority, which
    /// generates the token signing key.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::InvalidOptionValue` for a missing path and
    /// `IssuanceError::Configuration` for unusable configuration.
    pub fn load_config(self) -> Result<OfflineIssuance<ConfigLoaded>> {
        let path = self.config_path()?;
        let config = OfflineConfig::load(path)?;
        let authority = OfflineAuthority::from_config(&config)?;
        tracing::info!(config = %path.display(), "offline authority loaded");
        Ok(OfflineIssuance {
            state: ConfigLoaded { authority },
        })
    }
}

impl OfflineIssuance<ConfigLoaded> {
    #[must_use]
    pub const fn authority(&self) -> &OfflineAuthority {
        &self.state.authority
    }

    /// # Errors
    ///
    /// See [`OfflineAuthority::generate_token`].
    pub fn generate_token(self, subject: &str) -> Result<OfflineIssuance<TokenGenerated>> {
        let token = self.state.authority.generate_token(subject)?;
        Ok(OfflineIssuance {
            state: TokenGenerated {
                authority: self.state.authority,
                token,
            },
        })
    }
}

impl OfflineIssuance<TokenGenerated> {
    #[must_use]
    pub fn token(&self) -> &str {
        &self.state.token
    }

    /// Generates a key and a CSR for the names the token authorizes.
    ///
    /// # Errors
    ///
    /// See [`request::from_token`].
    pub fn build_request(self) -> Result<OfflineIssuance<CsrBuilt>> {
        let claims = certflow_jwt::parse_unverified(&self.state.token)?;
        let request = request::from_token(&claims)?;
        Ok(OfflineIssuance {
            state: CsrBuilt {
                authority: self.state.authority,
                token: self.state.token,
                request,
            },
        })
    }
}

impl OfflineIssuance<CsrBuilt> {
    #[must_use]
    pub const fn request(&self) -> &BuiltRequest {
        &self.state.request
    }

    /// Signs the request locally. The token is consumed by the authority.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::AuthorityRejection` when the authority declines
    /// and `IssuanceError::Encoding` for unusable output.
    pub fn sign(self, validity: Validity) -> Result<OfflineIssuance<Signed>> {
        let CsrBuilt {
            authority,
            token,
            request,
        } = self.state;
        let issued: IssuedCertificate = submit(&authority, &request.csr, &token, validity)?;
        Ok(OfflineIssuance {
            state: Signed {
                bundle: issued.into_bundle(request.private_key_pem),
            },
        })
    }
}

impl OfflineIssuance<Signed> {
    #[must_use]
    pub const fn bundle(&self) -> &CertificateBundle {
        &self.state.bundle
    }

    /// # Errors
    ///
    /// See [`LocalStorage::store`].
    pub fn persist(self, storage: &LocalStorage) -> Result<OfflineIssuance<Persisted>> {
        let outcome = storage.store(&self.state.bundle)?;
        Ok(OfflineIssuance {
            state: Persisted { outcome },
        })
    }
}

impl OfflineIssuance<Persisted> {
    #[must_use]
    pub const fn outcome(&self) -> &StorageOutcome {
        &self.state.outcome
    }

    #[must_use]
    pub fn into_outcome(self) -> StorageOutcome {
        self.state.outcome
    }
}

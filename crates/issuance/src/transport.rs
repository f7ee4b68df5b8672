//! Wire types and transports for the authority's signing endpoint.

use std::fmt;
use std::fs;
use std::time::Duration;

use certflow_x509::{fingerprints_match, parse_certificate_pem, pem_fingerprint};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize, Serializer};
use time::OffsetDateTime;
use url::Url;

use crate::error::{IssuanceError, Result};
use crate::trust::{ResolvedAuthority, TrustAnchor};
use crate::validity::{format_rfc3339, Validity};

/// Body of `POST /sign`.
#[derive(Clone, Serialize)]
pub struct SignRequest {
    /// CSR PEM.
    pub csr: String,
    /// One-time authorization token.
    pub ott: String,
    #[serde(
        rename = "notBefore",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rfc3339"
    )]
    pub not_before: Option<OffsetDateTime>,
    #[serde(
        rename = "notAfter",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rfc3339"
    )]
    pub not_after: Option<OffsetDateTime>,
}

impl SignRequest {
    #[must_use]
    pub fn new(csr: impl Into<String>, ott: impl Into<String>, validity: Validity) -> Self {
        Self {
            csr: csr.into(),
            ott: ott.into(),
            not_before: validity.not_before,
            not_after: validity.not_after,
        }
    }

    /// Requested window.
    #[must_use]
    pub const fn validity(&self) -> Validity {
        Validity {
            not_before: self.not_before,
            not_after: self.not_after,
        }
    }
}

impl fmt::Debug for SignRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("csr", &self.csr)
            .field("ott", &"<redacted>")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}

#[allow(clippy::ref_option)]
fn serialize_rfc3339<S>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => serializer.serialize_str(&format_rfc3339(*at)),
        None => serializer.serialize_none(),
    }
}

/// Body returned by `POST /sign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// Leaf certificate PEM.
    pub crt: String,
    /// Issuing authority certificate PEM.
    pub ca: String,
    /// Full chain, when the authority sends it. Not used for output.
    #[serde(rename = "certChain", default, skip_serializing_if = "Vec::is_empty")]
    pub cert_chain: Vec<String>,
}

#[derive(Deserialize)]
struct RootResponse {
    ca: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Something that signs CSRs on behalf of an authority.
pub trait AuthorityTransport {
    /// Submits the request and returns the certificate pair.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Transport` when the authority is unreachable
    /// and `IssuanceError::AuthorityRejection` when it declines.
    fn sign(&self, request: &SignRequest) -> Result<SignResponse>;
}

/// Opens a transport bound to a resolved authority.
pub trait Connector {
    /// Connects to `authority`, authenticating it with its trust anchor.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Transport` when the anchor cannot be
    /// established and `IssuanceError::Configuration` for an unusable root file.
    fn connect(&self, authority: &ResolvedAuthority) -> Result<Box<dyn AuthorityTransport>>;
}

impl<C: Connector + ?Sized> Connector for &C {
    fn connect(&self, authority: &ResolvedAuthority) -> Result<Box<dyn AuthorityTransport>> {
        (**self).connect(authority)
    }
}

/// HTTPS connector backed by a blocking `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    timeout: Option<Duration>,
}

impl HttpConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Overrides the transport's default request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn client_builder(&self) -> reqwest::blocking::ClientBuilder {
        let builder = Client::builder().no_proxy();
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    /// Fetches `GET /root/{fingerprint}` without verifying the server and
    /// accepts the root only if its SHA-256 matches the pin.
    fn bootstrap_root(&self, base: &Url, fingerprint: &str) -> Result<String> {
        let url = endpoint(base, &format!("/root/{fingerprint}"))?;
        let client = self
            .client_builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| IssuanceError::transport("failed to build http client", err))?;
        let response = client
            .get(url.clone())
            .send()
            .map_err(|err| IssuanceError::transport(format!("error fetching {url}"), err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IssuanceError::Transport {
                context: format!("error fetching root certificate from {url}: status {status}"),
                source: None,
            });
        }
        let body: RootResponse = response.json().map_err(|err| {
            IssuanceError::transport("root certificate response is not valid JSON", err)
        })?;
        let actual = pem_fingerprint(&body.ca)
            .map_err(|err| IssuanceError::transport("root certificate is not valid PEM", err))?;
        if !fingerprints_match(fingerprint, &actual) {
            return Err(IssuanceError::Transport {
                context: format!(
                    "root certificate fingerprint mismatch: expected {fingerprint}, got {actual}"
                ),
                source: None,
            });
        }
        tracing::debug!(fingerprint = %actual, "bootstrapped authority root");
        Ok(body.ca)
    }
}

impl Connector for HttpConnector {
    fn connect(&self, authority: &ResolvedAuthority) -> Result<Box<dyn AuthorityTransport>> {
        tracing::info!(
            authority = %authority.url,
            trust = %authority.anchor,
            "connecting to authority"
        );
        let root_pem = match &authority.anchor {
            TrustAnchor::Pinned { fingerprint } => {
                self.bootstrap_root(&authority.url, fingerprint)?
            }
            TrustAnchor::File { path } => {
                let pem = fs::read_to_string(path).map_err(|err| {
                    IssuanceError::Configuration(format!(
                        "error reading root certificate {}: {err}",
                        path.display()
                    ))
                })?;
                parse_certificate_pem(&pem).map_err(|err| {
                    IssuanceError::Configuration(format!(
                        "error parsing root certificate {}: {err}",
                        path.display()
                    ))
                })?;
                pem
            }
        };
        let root = reqwest::Certificate::from_pem(root_pem.as_bytes())
            .map_err(|err| IssuanceError::transport("root certificate rejected by TLS stack", err))?;
        let client = self
            .client_builder()
            .tls_built_in_root_certs(false)
            .add_root_certificate(root)
            .build()
            .map_err(|err| IssuanceError::transport("failed to build http client", err))?;
        Ok(Box::new(HttpAuthority {
            client,
            base: authority.url.clone(),
        }))
    }
}

/// Remote authority reached over HTTP(S).
#[derive(Debug)]
pub struct HttpAuthority {
    client: Client,
    base: Url,
}

impl AuthorityTransport for HttpAuthority {
    fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        let url = endpoint(&self.base, "/sign")?;
        tracing::debug!(%url, "submitting signing request");
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .map_err(|err| IssuanceError::transport(format!("error posting to {url}"), err))?;
        let status = response.status();
        if status.is_success() {
            return response.json().map_err(|err| IssuanceError::Encoding {
                context: format!("unexpected response from {url}: {err}"),
                source: None,
            });
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_owned()
                } else {
                    trimmed.to_owned()
                }
            });
        Err(IssuanceError::AuthorityRejection {
            status: status.as_u16(),
            message,
        })
    }
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|err| IssuanceError::invalid_option("ca-url", base.as_str(), err.to_string()))
}

//! Chooses how the authority will be located and authenticated.

use std::fmt;
use std::path::PathBuf;

use certflow_jwt::TokenClaims;
use url::Url;

use crate::error::{IssuanceError, Result};

/// How the authority's TLS identity is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchor {
    /// SHA-256 fingerprint of the root certificate, fetched once and compared.
    Pinned { fingerprint: String },
    /// Root certificate PEM file on disk.
    File { path: PathBuf },
}

impl fmt::Display for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinned { fingerprint } => write!(f, "pinned root {fingerprint}"),
            Self::File { path } => write!(f, "root file {}", path.display()),
        }
    }
}

/// Caller supplied authority settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityOptions {
    /// `--ca-url`
    pub ca_url: Option<String>,
    /// `--root`
    pub root: Option<PathBuf>,
    /// Root used when `root` is unset, if it exists on disk.
    pub default_root: Option<PathBuf>,
}

impl AuthorityOptions {
    /// The authority URL, which must be given explicitly.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::MissingRequiredOption("ca-url")` when unset and
    /// `IssuanceError::InvalidOptionValue` when it is not an http(s) URL.
    pub fn require_ca_url(&self) -> Result<Url> {
        let raw = self
            .ca_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(IssuanceError::MissingRequiredOption("ca-url"))?;
        parse_authority_url("ca-url", raw)
    }

    /// The root file: `root`, else `default_root` when present on disk.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::MissingRequiredOption("root")` when neither applies.
    pub fn require_root(&self) -> Result<PathBuf> {
        if let Some(root) = self.root.as_ref().filter(|root| !root.as_os_str().is_empty()) {
            return Ok(root.clone());
        }
        self.default_root
            .as_ref()
            .filter(|root| root.exists())
            .cloned()
            .ok_or(IssuanceError::MissingRequiredOption("root"))
    }
}

/// Authority endpoint and the anchor used to authenticate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthority {
    pub url: Url,
    pub anchor: TrustAnchor,
}

/// Picks pinned trust when the token names both a root fingerprint and an
/// http(s) audience, otherwise the caller's URL and root file.
///
/// # Errors
///
/// Returns `IssuanceError::MissingRequiredOption` for a missing `ca-url` or
/// `root`, and `IssuanceError::InvalidOptionValue` for unusable URLs.
pub fn resolve(claims: &TokenClaims, options: &AuthorityOptions) -> Result<ResolvedAuthority> {
    if let (Some(fingerprint), Some(audience)) = (claims.fingerprint(), claims.first_audience()) {
        if audience.to_ascii_lowercase().starts_with("http") {
            let url = parse_authority_url("token", audience)?;
            tracing::debug!(authority = %url, "token pins the authority root");
            return Ok(ResolvedAuthority {
                url,
                anchor: TrustAnchor::Pinned {
                    fingerprint: fingerprint.to_owned(),
                },
            });
        }
    }
    let url = options.require_ca_url()?;
    let path = options.require_root()?;
    Ok(ResolvedAuthority {
        url,
        anchor: TrustAnchor::File { path },
    })
}

pub(crate) fn parse_authority_url(option: &'static str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| IssuanceError::invalid_option(option, raw, err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(IssuanceError::invalid_option(
            option,
            raw,
            "authority URL must be an absolute http or https URL",
        ));
    }
    Ok(url)
}

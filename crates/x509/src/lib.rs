#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! X.509 helpers for certflow: subject alternative names, CSR generation and
//! parsing, a small local CA and SHA-256 fingerprints.

pub mod ca;
pub mod certificate;
pub mod csr;

use std::fmt;
use std::net::IpAddr;

use rcgen::string::Ia5String;
use rcgen::SanType;
use thiserror::Error;

pub use certificate::{
    fingerprints_match, parse_certificate_pem, pem_fingerprint, sha256_fingerprint,
    split_certificates, CertificateInfo,
};
pub use csr::{generate_csr, parse_csr_pem, CsrInfo, GeneratedCsr};

/// X.509 errors.
#[derive(Debug, Error)]
pub enum X509Error {
    /// rcgen rejected the parameters or key material.
    #[error("certificate generation failed: {0}")]
    Rcgen(#[from] rcgen::Error),
    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    /// Input is not PEM.
    #[error("invalid PEM: {0}")]
    Pem(String),
    /// DER structure could not be parsed.
    #[error("invalid DER: {0}")]
    Der(String),
    /// PEM block is not a certificate request.
    #[error("expected a CERTIFICATE REQUEST block, found {0}")]
    NotACertificateRequest(String),
    /// PEM block is not a certificate.
    #[error("expected a CERTIFICATE block, found {0}")]
    NotACertificate(String),
    /// Subject common name is missing.
    #[error("subject common name is missing")]
    MissingCommonName,
    /// Subject is empty.
    #[error("subject must not be empty")]
    EmptySubject,
    /// SAN value cannot be encoded.
    #[error("invalid subject alternative name: {0}")]
    InvalidSan(String),
}

/// Result alias for X.509 operations.
pub type Result<T> = std::result::Result<T, X509Error>;

/// Subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectAltName {
    /// DNS name.
    Dns(String),
    /// IP address.
    Ip(IpAddr),
    /// RFC 822 e-mail address.
    Email(String),
    /// URI.
    Uri(String),
}

impl SubjectAltName {
    /// Classifies a raw name: IP literal, then e-mail (`@`), then URI
    /// (`scheme:`), otherwise DNS.
    ///
    /// # Errors
    ///
    /// Returns `X509Error::InvalidSan` for an empty value.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(X509Error::InvalidSan("empty value".to_owned()));
        }
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        if looks_like_email(trimmed) {
            return Ok(Self::Email(trimmed.to_owned()));
        }
        if looks_like_uri(trimmed) {
            return Ok(Self::Uri(trimmed.to_owned()));
        }
        Ok(Self::Dns(trimmed.to_owned()))
    }

    /// Classifies every entry of `values`, skipping blanks.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::parse`].
    pub fn parse_all<I, S>(values: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .filter(|value| !value.as_ref().trim().is_empty())
            .map(|value| Self::parse(value.as_ref()))
            .collect()
    }

    /// Converts to the rcgen representation.
    ///
    /// # Errors
    ///
    /// Returns `X509Error::InvalidSan` when the value is not IA5.
    pub fn to_san_type(&self) -> Result<SanType> {
        let ia5 = |value: &str| {
            Ia5String::try_from(value).map_err(|_| X509Error::InvalidSan(value.to_owned()))
        };
        Ok(match self {
            Self::Dns(value) => SanType::DnsName(ia5(value)?),
            Self::Ip(addr) => SanType::IpAddress(*addr),
            Self::Email(value) => SanType::Rfc822Name(ia5(value)?),
            Self::Uri(value) => SanType::URI(ia5(value)?),
        })
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns(value) | Self::Email(value) | Self::Uri(value) => f.write_str(value),
            Self::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

/// PEM text with LF line endings. `pem::encode` defaults to CRLF.
pub(crate) fn encode_pem(block: &pem::Pem) -> String {
    pem::encode_config(
        block,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

fn looks_like_email(value: &str) -> bool {
    value.rsplit_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.is_empty()
            && !local.contains(':')
            && !domain.contains(['/', ':', '@'])
    })
}

fn looks_like_uri(value: &str) -> bool {
    value.split_once(':').is_some_and(|(scheme, rest)| {
        !scheme.is_empty()
            && !rest.is_empty()
            && scheme
                .chars()
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            && !rest.chars().all(|c| c.is_ascii_digit())
    })
}

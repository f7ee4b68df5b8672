//! Builds certificate signing requests.

use std::fmt;
use std::fs;
use std::path::Path;

use certflow_jwt::TokenClaims;
use certflow_x509::{generate_csr, parse_csr_pem, CsrInfo, SubjectAltName, X509Error};
use zeroize::Zeroizing;

use crate::error::{IssuanceError, Result};

/// A CSR ready for submission, with its key when one was generated here.
pub struct BuiltRequest {
    pub csr: CsrInfo,
    pub private_key_pem: Option<Zeroizing<String>>,
}

impl fmt::Debug for BuiltRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltRequest")
            .field("csr", &self.csr)
            .field("has_private_key", &self.private_key_pem.is_some())
            .finish()
    }
}

/// Generates a fresh key and a CSR for `subject`.
///
/// SANs are classified as IP, e-mail, URI or DNS; with none given the
/// subject becomes the only DNS name.
///
/// # Errors
///
/// Returns `IssuanceError::InvalidOptionValue` for an empty subject or an
/// unusable SAN, and `IssuanceError::Encoding` when key or CSR generation fails.
pub fn from_subject(subject: &str, sans: &[String]) -> Result<BuiltRequest> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(IssuanceError::invalid_option(
            "subject",
            subject,
            "subject must not be empty",
        ));
    }
    let names = if sans.iter().all(|san| san.trim().is_empty()) {
        vec![SubjectAltName::parse(subject)
            .map_err(|err| IssuanceError::invalid_option("subject", subject, err.to_string()))?]
    } else {
        SubjectAltName::parse_all(sans)
            .map_err(|err| IssuanceError::invalid_option("san", sans.join(","), err.to_string()))?
    };
    let generated = generate_csr(subject, &names)
        .map_err(|err| IssuanceError::encoding("error creating certificate request", err))?;
    let csr = parse_csr_pem(&generated.csr_pem)
        .map_err(|err| IssuanceError::encoding("error reading generated request", err))?;
    tracing::debug!(subject, sans = names.len(), "generated certificate request");
    Ok(BuiltRequest {
        csr,
        private_key_pem: Some(Zeroizing::new(generated.private_key_pem)),
    })
}

/// Generates a CSR for the names a token authorizes: its `sans`, else its subject.
///
/// # Errors
///
/// See [`from_subject`].
pub fn from_token(claims: &TokenClaims) -> Result<BuiltRequest> {
    from_subject(&claims.subject, &claims.requested_names())
}

/// Reads a PEM CSR from disk. No key is produced.
///
/// # Errors
///
/// Returns `IssuanceError::Configuration` when the file cannot be read,
/// `IssuanceError::NotACertificateRequest` when it holds another PEM type and
/// `IssuanceError::Encoding` when the request is malformed.
pub fn from_file(path: &Path) -> Result<BuiltRequest> {
    let contents = fs::read_to_string(path).map_err(|err| {
        IssuanceError::Configuration(format!("error reading {}: {err}", path.display()))
    })?;
    let csr = parse_csr_pem(&contents).map_err(|err| match err {
        X509Error::NotACertificateRequest(_) => IssuanceError::NotACertificateRequest {
            path: path.to_path_buf(),
        },
        other => IssuanceError::encoding(format!("error parsing {}", path.display()), other),
    })?;
    Ok(BuiltRequest {
        csr,
        private_key_pem: None,
    })
}

//! Submits a CSR and token to the authority and validates what comes back.

use certflow_jwt::ClaimsSource;
use certflow_x509::{parse_certificate_pem, split_certificates, CsrInfo};
use zeroize::Zeroizing;

use crate::error::{IssuanceError, Result};
use crate::identity::ensure_token_subject_matches;
use crate::storage::CertificateBundle;
use crate::transport::{AuthorityTransport, Connector, SignRequest, SignResponse};
use crate::trust::{self, AuthorityOptions};
use crate::validity::Validity;

/// Leaf and issuing authority certificate returned by a signing exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub leaf_pem: String,
    pub authority_pem: String,
}

impl IssuedCertificate {
    /// Checks that both halves are single PEM `CERTIFICATE` blocks.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Encoding` for anything else.
    pub fn from_response(response: SignResponse) -> Result<Self> {
        Ok(Self {
            leaf_pem: single_certificate("leaf certificate", &response.crt)?,
            authority_pem: single_certificate("authority certificate", &response.ca)?,
        })
    }

    /// Bundles the pair for persistence, attaching a generated key if any.
    #[must_use]
    pub fn into_bundle(self, private_key_pem: Option<Zeroizing<String>>) -> CertificateBundle {
        CertificateBundle::new(self.leaf_pem, self.authority_pem, private_key_pem)
    }
}

fn single_certificate(what: &str, pem: &str) -> Result<String> {
    let mut blocks = split_certificates(pem)
        .map_err(|err| IssuanceError::encoding(format!("error parsing {what}"), err))?;
    if blocks.len() != 1 {
        return Err(IssuanceError::Encoding {
            context: format!("{what} holds {} certificates, expected one", blocks.len()),
            source: None,
        });
    }
    let block = blocks.remove(0);
    parse_certificate_pem(&block)
        .map_err(|err| IssuanceError::encoding(format!("error parsing {what}"), err))?;
    Ok(block)
}

/// Signs CSRs against the authority a token designates.
#[derive(Debug, Clone)]
pub struct IssuanceClient<C> {
    connector: C,
    authority: AuthorityOptions,
}

impl<C: Connector> IssuanceClient<C> {
    #[must_use]
    pub const fn new(connector: C, authority: AuthorityOptions) -> Self {
        Self {
            connector,
            authority,
        }
    }

    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Submits `csr` under `token`.
    ///
    /// The token subject must name the CSR's common name; the authority is
    /// located from the token when it pins a root, else from the options.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::TokenParse`, `SubjectMismatch`,
    /// `MissingRequiredOption`, `Transport`, `AuthorityRejection` or
    /// `Encoding` for the stage that failed.
    pub fn sign(
        &self,
        csr: &CsrInfo,
        token: &str,
        validity: Validity,
    ) -> Result<IssuedCertificate> {
        let claims = token.parse_claims()?;
        ensure_token_subject_matches(&claims.subject, &csr.common_name)?;
        let authority = trust::resolve(&claims, &self.authority)?;
        let transport = self.connector.connect(&authority)?;
        let issued = submit(transport.as_ref(), csr, token, validity)?;
        tracing::info!(
            authority = %authority.url,
            subject = %csr.common_name,
            "certificate issued"
        );
        Ok(issued)
    }
}

/// One signing exchange against an already connected transport.
///
/// # Errors
///
/// Propagates transport errors and returns `IssuanceError::Encoding` for
/// unusable certificates in the response.
pub fn submit(
    transport: &dyn AuthorityTransport,
    csr: &CsrInfo,
    token: &str,
    validity: Validity,
) -> Result<IssuedCertificate> {
    let request = SignRequest::new(csr.pem.clone(), token, validity);
    let response = transport.sign(&request)?;
    IssuedCertificate::from_response(response)
}

//! Certificate signing requests.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use crate::{encode_pem, Result, SubjectAltName, X509Error};

/// Freshly generated CSR with its private key.
#[derive(Clone)]
pub struct GeneratedCsr {
    /// `CERTIFICATE REQUEST` PEM.
    pub csr_pem: String,
    /// PKCS#8 `PRIVATE KEY` PEM.
    pub private_key_pem: String,
}

impl std::fmt::Debug for GeneratedCsr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCsr")
            .field("csr_pem", &self.csr_pem)
            .finish_non_exhaustive()
    }
}

/// Identity carried by a parsed CSR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrInfo {
    /// Subject common name.
    pub common_name: String,
    /// Requested subject alternative names, in request order.
    pub sans: Vec<SubjectAltName>,
    /// The request re-encoded as PEM.
    pub pem: String,
}

/// Generates an ECDSA P-256 key pair and a CSR for `subject`.
///
/// Every call produces a new key. `sans` go into the extension request as
/// given; the caller decides whether the subject belongs there.
///
/// # Errors
///
/// Returns `X509Error::EmptySubject` for a blank subject and
/// `X509Error::KeyGeneration` or `X509Error::Rcgen` when encoding fails.
pub fn generate_csr(subject: &str, sans: &[SubjectAltName]) -> Result<GeneratedCsr> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(X509Error::EmptySubject);
    }
    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|err| X509Error::KeyGeneration(err.to_string()))?;

    let mut params = CertificateParams::default();
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, subject);
    params.distinguished_name = name;
    params.subject_alt_names = sans
        .iter()
        .map(SubjectAltName::to_san_type)
        .collect::<Result<_>>()?;

    let request = params.serialize_request(&key_pair)?;
    Ok(GeneratedCsr {
        csr_pem: request.pem()?,
        private_key_pem: key_pair.serialize_pem(),
    })
}

/// Parses a PEM encoded CSR.
///
/// # Errors
///
/// Returns `X509Error::NotACertificateRequest` when the PEM block carries any
/// other label, `X509Error::Pem`/`X509Error::Der` for undecodable input and
/// `X509Error::MissingCommonName` when the subject has no CN.
pub fn parse_csr_pem(input: &str) -> Result<CsrInfo> {
    let block = pem::parse(input).map_err(|err| X509Error::Pem(err.to_string()))?;
    if block.tag() != "CERTIFICATE REQUEST" && block.tag() != "NEW CERTIFICATE REQUEST" {
        return Err(X509Error::NotACertificateRequest(block.tag().to_owned()));
    }
    let (_, request) = X509CertificationRequest::from_der(block.contents())
        .map_err(|err| X509Error::Der(err.to_string()))?;

    let common_name = request
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
        .ok_or(X509Error::MissingCommonName)?;

    let mut sans = Vec::new();
    if let Some(extensions) = request.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(names) = extension {
                sans.extend(names.general_names.iter().filter_map(from_general_name));
            }
        }
    }

    Ok(CsrInfo {
        common_name,
        sans,
        pem: encode_pem(&pem::Pem::new("CERTIFICATE REQUEST", block.contents())),
    })
}

pub(crate) fn from_general_name(name: &GeneralName<'_>) -> Option<SubjectAltName> {
    match name {
        GeneralName::DNSName(value) => Some(SubjectAltName::Dns((*value).to_owned())),
        GeneralName::RFC822Name(value) => Some(SubjectAltName::Email((*value).to_owned())),
        GeneralName::URI(value) => Some(SubjectAltName::Uri((*value).to_owned())),
        GeneralName::IPAddress(bytes) => match bytes.len() {
            4 => <[u8; 4]>::try_from(*bytes)
                .ok()
                .map(|octets| SubjectAltName::Ip(octets.into())),
            16 => <[u8; 16]>::try_from(*bytes)
                .ok()
                .map(|octets| SubjectAltName::Ip(octets.into())),
            _ => None,
        },
        _ => None,
    }
}

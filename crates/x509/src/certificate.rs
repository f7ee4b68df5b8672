//! Certificate inspection and fingerprints.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::csr::from_general_name;
use crate::{encode_pem, Result, SubjectAltName, X509Error};

/// Fields of a certificate that issuance cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject common name, if present.
    pub common_name: Option<String>,
    /// Issuer common name, if present.
    pub issuer_common_name: Option<String>,
    /// Subject alternative names.
    pub sans: Vec<SubjectAltName>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// `basicConstraints` CA flag.
    pub is_ca: bool,
    /// Lowercase hex SHA-256 of the DER encoding.
    pub fingerprint: String,
}

/// Lowercase hex SHA-256 of `der`.
#[must_use]
pub fn sha256_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Fingerprint of the first `CERTIFICATE` block in `input`.
///
/// # Errors
///
/// Returns `X509Error::Pem` for undecodable input and
/// `X509Error::NotACertificate` for other PEM labels.
pub fn pem_fingerprint(input: &str) -> Result<String> {
    let block = first_certificate_block(input)?;
    Ok(sha256_fingerprint(block.contents()))
}

/// Compares two hex fingerprints ignoring case and `:` separators.
#[must_use]
pub fn fingerprints_match(left: &str, right: &str) -> bool {
    let normalize = |value: &str| {
        value
            .trim()
            .chars()
            .filter(|c| *c != ':')
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    let left = normalize(left);
    !left.is_empty() && left == normalize(right)
}

/// Splits a PEM bundle into its `CERTIFICATE` blocks, re-encoded one by one.
///
/// # Errors
///
/// Returns `X509Error::Pem` when the bundle holds no PEM, and
/// `X509Error::NotACertificate` when any block carries another label.
pub fn split_certificates(input: &str) -> Result<Vec<String>> {
    let blocks = pem::parse_many(input).map_err(|err| X509Error::Pem(err.to_string()))?;
    if blocks.is_empty() {
        return Err(X509Error::Pem("no PEM blocks found".to_owned()));
    }
    blocks
        .into_iter()
        .map(|block| {
            if block.tag() == "CERTIFICATE" {
                X509Certificate::from_der(block.contents())
                    .map_err(|err| X509Error::Der(err.to_string()))?;
                Ok(encode_pem(&block))
            } else {
                Err(X509Error::NotACertificate(block.tag().to_owned()))
            }
        })
        .collect()
}

/// Parses the first `CERTIFICATE` block in `input`.
///
/// # Errors
///
/// Returns `X509Error` when the PEM, the label or the DER is invalid.
pub fn parse_certificate_pem(input: &str) -> Result<CertificateInfo> {
    let block = first_certificate_block(input)?;
    let (_, certificate) = X509Certificate::from_der(block.contents())
        .map_err(|err| X509Error::Der(err.to_string()))?;

    let first_cn = |name: &x509_parser::x509::X509Name<'_>| {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned)
    };
    let sans = certificate
        .subject_alternative_name()
        .map_err(|err| X509Error::Der(err.to_string()))?
        .map(|extension| {
            extension
                .value
                .general_names
                .iter()
                .filter_map(from_general_name)
                .collect()
        })
        .unwrap_or_default();
    let validity = certificate.validity();

    Ok(CertificateInfo {
        common_name: first_cn(certificate.subject()),
        issuer_common_name: first_cn(certificate.issuer()),
        sans,
        not_before: validity.not_before.to_datetime(),
        not_after: validity.not_after.to_datetime(),
        is_ca: certificate.is_ca(),
        fingerprint: sha256_fingerprint(block.contents()),
    })
}

fn first_certificate_block(input: &str) -> Result<pem::Pem> {
    let block = pem::parse(input).map_err(|err| X509Error::Pem(err.to_string()))?;
    if block.tag() != "CERTIFICATE" {
        return Err(X509Error::NotACertificate(block.tag().to_owned()));
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_comparison_ignores_case_and_colons() {
        assert!(fingerprints_match("ABCD01", "ab:cd:01"));
        assert!(fingerprints_match(" abcd01 ", "ABCD01"));
        assert!(!fingerprints_match("abcd01", "abcd02"));
        assert!(!fingerprints_match("", ""));
    }

    #[test]
    fn fingerprint_is_lowercase_hex_sha256() {
        let fp = sha256_fingerprint(b"abc");
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn split_blocks_keep_lf_line_endings() {
        let root = crate::ca::generate_root_ca(&crate::ca::RootCaParams::new("Split Root"))
            .expect("root");
        let bundle = format!("{}{}", root.certificate_pem, root.certificate_pem);
        let blocks = split_certificates(&bundle).expect("blocks");
        assert_eq!(blocks.len(), 2);
        for block in &blocks {
            assert!(!block.contains('\r'));
            assert_eq!(block.trim(), root.certificate_pem.trim());
        }
    }

    #[test]
    fn rejects_non_certificate_blocks() {
        let key = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0_u8; 4]));
        assert!(matches!(
            pem_fingerprint(&key),
            Err(X509Error::NotACertificate(tag)) if tag == "PRIVATE KEY"
        ));
        assert!(matches!(split_certificates(""), Err(X509Error::Pem(_))));
    }
}

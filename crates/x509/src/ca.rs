//! Local certificate authority.
//!
//! Enough of a CA to back offline issuance: a self-signed root, an
//! intermediate issued by it and leaf certificates signed from a CSR.
//!
//! ```rust
//! use certflow_x509::ca::{generate_root_ca, issue_intermediate_ca, sign_csr};
//! use certflow_x509::ca::{IntermediateCaParams, RootCaParams, SignCsrParams};
//! use certflow_x509::generate_csr;
//! use time::{Duration, OffsetDateTime};
//!
//! # fn example() -> Result<(), certflow_x509::X509Error> {
//! let root = generate_root_ca(&RootCaParams::new("Example Root CA"))?;
//! let issuing = issue_intermediate_ca(&IntermediateCaParams {
//!     common_name: "Example Intermediate CA",
//!     validity_days: 365,
//!     issuer_cert_pem: &root.certificate_pem,
//!     issuer_key_pem: &root.private_key_pem,
//! })?;
//! let csr = generate_csr("internal.example.com", &[])?;
//! let now = OffsetDateTime::now_utc();
//! let leaf = sign_csr(&SignCsrParams {
//!     csr_pem: &csr.csr_pem,
//!     issuer_cert_pem: &issuing.certificate_pem,
//!     issuer_key_pem: &issuing.private_key_pem,
//!     not_before: now,
//!     not_after: now + Duration::hours(24),
//! })?;
//! # let _ = leaf;
//! # Ok(())
//! # }
//! ```

use rand_core::{OsRng, RngCore};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DnType,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use time::{Duration, OffsetDateTime};

use crate::{Result, X509Error};

/// CA keys are ECDSA P-256 with SHA-256.
fn generate_keypair() -> Result<KeyPair> {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|err| X509Error::KeyGeneration(err.to_string()))
}

/// Parameters for root CA generation.
#[derive(Debug, Clone)]
pub struct RootCaParams<'a> {
    /// Certificate common name (CN).
    pub common_name: &'a str,
    /// Validity period in days.
    pub validity_days: u32,
}

impl<'a> RootCaParams<'a> {
    /// Ten-year ECDSA P-256 root.
    #[must_use]
    pub const fn new(common_name: &'a str) -> Self {
        Self {
            common_name,
            validity_days: 3650,
        }
    }
}

/// Parameters for intermediate CA issuance.
#[derive(Debug, Clone)]
pub struct IntermediateCaParams<'a> {
    /// Intermediate common name (CN).
    pub common_name: &'a str,
    /// Validity period in days.
    pub validity_days: u32,
    /// Issuer certificate PEM.
    pub issuer_cert_pem: &'a str,
    /// Issuer private key PEM.
    pub issuer_key_pem: &'a str,
}

/// Parameters for signing a CSR.
#[derive(Debug, Clone)]
pub struct SignCsrParams<'a> {
    /// `CERTIFICATE REQUEST` PEM.
    pub csr_pem: &'a str,
    /// Issuer certificate PEM.
    pub issuer_cert_pem: &'a str,
    /// Issuer private key PEM.
    pub issuer_key_pem: &'a str,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Generated CA certificate and key.
#[derive(Clone)]
pub struct CaCertificate {
    /// Certificate PEM.
    pub certificate_pem: String,
    /// Private key PEM.
    pub private_key_pem: String,
}

/// Generates a self-signed root CA.
///
/// # Errors
///
/// Returns `X509Error` if key generation or signing fails.
pub fn generate_root_ca(params: &RootCaParams<'_>) -> Result<CaCertificate> {
    let cert_params = ca_params(params.common_name, params.validity_days)?;
    let key_pair = generate_keypair()?;
    let certificate = cert_params.self_signed(&key_pair)?;
    Ok(CaCertificate {
        certificate_pem: certificate.pem(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

/// Issues an intermediate CA signed by an existing issuer.
///
/// # Errors
///
/// Returns `X509Error` if the issuer material is invalid or signing fails.
pub fn issue_intermediate_ca(params: &IntermediateCaParams<'_>) -> Result<CaCertificate> {
    let mut cert_params = ca_params(params.common_name, params.validity_days)?;
    cert_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));

    let issuer_key = KeyPair::from_pem(params.issuer_key_pem)?;
    let issuer = Issuer::from_ca_cert_pem(params.issuer_cert_pem, issuer_key)?;
    let key_pair = generate_keypair()?;
    let certificate = cert_params.signed_by(&key_pair, &issuer)?;
    Ok(CaCertificate {
        certificate_pem: certificate.pem(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

/// Signs the CSR as a TLS leaf certificate.
///
/// Subject and SANs are taken from the request unchanged; validity comes
/// from `params`.
///
/// # Errors
///
/// Returns `X509Error` if the CSR or the issuer material is invalid, or
/// signing fails.
pub fn sign_csr(params: &SignCsrParams<'_>) -> Result<String> {
    let mut request = CertificateSigningRequestParams::from_pem(params.csr_pem)?;
    request.params.is_ca = IsCa::ExplicitNoCa;
    request.params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    request.params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    request.params.not_before = params.not_before;
    request.params.not_after = params.not_after;
    request.params.serial_number = Some(random_serial());
    request.params.use_authority_key_identifier_extension = true;

    let issuer_key = KeyPair::from_pem(params.issuer_key_pem)?;
    let issuer = Issuer::from_ca_cert_pem(params.issuer_cert_pem, issuer_key)?;
    let certificate = request.signed_by(&issuer)?;
    Ok(certificate.pem())
}

fn ca_params(common_name: &str, validity_days: u32) -> Result<CertificateParams> {
    if common_name.trim().is_empty() {
        return Err(X509Error::EmptySubject);
    }
    let mut cert_params = CertificateParams::default();
    cert_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    cert_params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    cert_params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let now = OffsetDateTime::now_utc();
    cert_params.not_before = now - Duration::minutes(5);
    cert_params.not_after = now + Duration::days(i64::from(validity_days));
    cert_params.serial_number = Some(random_serial());
    Ok(cert_params)
}

// 16 random bytes, high bit cleared so the DER integer stays positive.
fn random_serial() -> SerialNumber {
    let mut serial = [0_u8; 16];
    OsRng.fill_bytes(&mut serial);
    serial[0] &= 0x7f;
    SerialNumber::from(serial.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate_csr, parse_certificate_pem, SubjectAltName};
    use pretty_assertions::assert_eq;
    use x509_parser::prelude::{FromDer, X509Certificate};

    fn der(pem_text: &str) -> Vec<u8> {
        pem::parse(pem_text).expect("pem").contents().to_vec()
    }

    fn chain() -> (CaCertificate, CaCertificate) {
        let root = generate_root_ca(&RootCaParams::new("Test Root CA")).expect("root");
        let issuing = issue_intermediate_ca(&IntermediateCaParams {
            common_name: "Test Issuing CA",
            validity_days: 365,
            issuer_cert_pem: &root.certificate_pem,
            issuer_key_pem: &root.private_key_pem,
        })
        .expect("intermediate");
        (root, issuing)
    }

    #[test]
    fn root_is_self_signed_ca() {
        let root = generate_root_ca(&RootCaParams::new("Test Root CA")).expect("root");
        let info = parse_certificate_pem(&root.certificate_pem).expect("info");
        assert!(info.is_ca);
        assert_eq!(info.common_name.as_deref(), Some("Test Root CA"));
        assert_eq!(info.issuer_common_name, info.common_name);
        let der = der(&root.certificate_pem);
        let (_, cert) = X509Certificate::from_der(&der).expect("parse");
        cert.verify_signature(None).expect("self signature");
    }

    #[test]
    fn intermediate_chains_to_root() {
        let (root, issuing) = chain();
        let root_der = der(&root.certificate_pem);
        let issuing_der = der(&issuing.certificate_pem);
        let (_, root_cert) = X509Certificate::from_der(&root_der).expect("root");
        let (_, issuing_cert) = X509Certificate::from_der(&issuing_der).expect("issuing");
        assert_eq!(issuing_cert.issuer(), root_cert.subject());
        issuing_cert
            .verify_signature(Some(root_cert.public_key()))
            .expect("signed by root");
        assert!(issuing_cert.is_ca());
    }

    #[test]
    fn signs_csr_with_requested_identity_and_window() {
        let (_, issuing) = chain();
        let sans = SubjectAltName::parse_all(["internal.example.com", "10.0.0.1"]).expect("sans");
        let csr = generate_csr("internal.example.com", &sans).expect("csr");
        let not_before = OffsetDateTime::from_unix_timestamp(1_900_000_000).expect("time");
        let not_after = not_before + Duration::hours(1);

        let leaf_pem = sign_csr(&SignCsrParams {
            csr_pem: &csr.csr_pem,
            issuer_cert_pem: &issuing.certificate_pem,
            issuer_key_pem: &issuing.private_key_pem,
            not_before,
            not_after,
        })
        .expect("leaf");

        let info = parse_certificate_pem(&leaf_pem).expect("info");
        assert_eq!(info.common_name.as_deref(), Some("internal.example.com"));
        assert_eq!(info.issuer_common_name.as_deref(), Some("Test Issuing CA"));
        assert_eq!(info.sans, sans);
        assert_eq!(info.not_before, not_before);
        assert_eq!(info.not_after, not_after);
        assert!(!info.is_ca);

        let leaf_der = der(&leaf_pem);
        let issuing_der = der(&issuing.certificate_pem);
        let (_, leaf) = X509Certificate::from_der(&leaf_der).expect("leaf");
        let (_, issuer) = X509Certificate::from_der(&issuing_der).expect("issuer");
        leaf.verify_signature(Some(issuer.public_key()))
            .expect("signed by intermediate");
    }

    #[test]
    fn rejects_blank_ca_name() {
        assert!(matches!(
            generate_root_ca(&RootCaParams::new(" ")),
            Err(X509Error::EmptySubject)
        ));
    }
}

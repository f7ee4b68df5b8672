#![forbid(unsafe_code)]
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Certificate issuance orchestration.
//!
//! Turns an authorization token and a certificate request, or a bare subject
//! name, into a signed certificate chain on disk. Three paths are supported:
//! a caller-supplied token, a token obtained from an [`AuthorizationIssuer`],
//! and fully offline signing against an in-process authority
//! ([`offline::OfflineIssuance`]).
//!
//! Identity checks run before anything leaves the process: the token subject
//! must name the CSR, and a caller hostname must match the CSR common name.
//! Trust in the authority comes either from a root fingerprint pinned in the
//! token or from a root certificate file.

pub mod client;
mod error;
pub mod flow;
pub mod identity;
pub mod issuer;
pub mod offline;
pub mod request;
mod settings;
pub mod storage;
pub mod transport;
pub mod trust;
pub mod validity;

pub use client::{IssuanceClient, IssuedCertificate};
pub use error::{IssuanceError, Result};
pub use flow::{CertificateOptions, IssuanceMode, Orchestrator};
pub use issuer::{AuthorizationIssuer, KeyFileIssuer, TokenRequest};
pub use settings::Settings;
pub use storage::{CertificateBundle, LocalStorage, StorageOutcome};
pub use transport::{
    AuthorityTransport, Connector, HttpConnector, SignRequest, SignResponse,
};
pub use trust::{AuthorityOptions, ResolvedAuthority, TrustAnchor};
pub use validity::{TimeOrDuration, Validity};

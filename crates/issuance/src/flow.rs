//! Entry points for the `certificate` and `sign` commands.

use std::path::{Path, PathBuf};

use certflow_jwt::ClaimsSource;

use crate::client::IssuanceClient;
use crate::error::{IssuanceError, Result};
use crate::identity::{
    ensure_hostname_matches, ensure_offline_without_token, ensure_token_without_sans,
};
use crate::issuer::{AuthorizationIssuer, TokenRequest};
use crate::offline::OfflineIssuance;
use crate::request;
use crate::storage::{LocalStorage, StorageOutcome};
use crate::transport::Connector;
use crate::trust::AuthorityOptions;
use crate::validity::Validity;

/// How a certificate is obtained. Chosen once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceMode {
    /// Remote authority, with a caller token or one from the issuer.
    Online { token: Option<String> },
    /// In-process authority built from a configuration file.
    Offline { config_path: Option<PathBuf> },
    /// Existing CSR file; no key is generated.
    DirectCsr { csr_path: PathBuf },
}

impl IssuanceMode {
    /// Mode for a new key and certificate.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::IncompatibleOptions` for offline mode with a token.
    pub fn for_new_certificate(options: &CertificateOptions) -> Result<Self> {
        ensure_offline_without_token(options.offline, options.token.as_deref())?;
        Ok(if options.offline {
            Self::Offline {
                config_path: options.ca_config.clone(),
            }
        } else {
            Self::Online {
                token: options.token().map(str::to_owned),
            }
        })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Online { .. } => "online",
            Self::Offline { .. } => "offline",
            Self::DirectCsr { .. } => "csr",
        }
    }
}

/// Options shared by both commands.
#[derive(Debug, Clone, Default)]
pub struct CertificateOptions {
    pub token: Option<String>,
    pub sans: Vec<String>,
    pub not_before: Option<String>,
    pub not_after: Option<String>,
    pub authority: AuthorityOptions,
    pub offline: bool,
    pub ca_config: Option<PathBuf>,
    pub force: bool,
}

impl CertificateOptions {
    fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    fn validity(&self) -> Result<Validity> {
        Validity::resolve(self.not_before.as_deref(), self.not_after.as_deref())
    }
}

/// Runs issuances against a connector, with an optional token issuer for
/// callers that bring no token.
pub struct Orchestrator<C> {
    connector: C,
    issuer: Option<Box<dyn AuthorizationIssuer>>,
}

impl<C: Connector> Orchestrator<C> {
    #[must_use]
    pub const fn new(connector: C) -> Self {
        Self {
            connector,
            issuer: None,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Box<dyn AuthorizationIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Issues a certificate for `subject` with a freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns the `IssuanceError` of the first failing stage; option
    /// conflicts are reported before any key generation or network access.
    pub fn new_certificate(
        &self,
        subject: &str,
        crt_file: &Path,
        key_file: &Path,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        let mode = IssuanceMode::for_new_certificate(options)?;
        let storage = LocalStorage::new(crt_file)
            .with_private_key_path(key_file)
            .with_force(options.force);
        self.issue(mode, subject, &storage, options)
    }

    /// Signs the CSR in `csr_file`, writing only the certificate.
    ///
    /// # Errors
    ///
    /// Returns the `IssuanceError` of the first failing stage.
    pub fn sign_certificate(
        &self,
        csr_file: &Path,
        crt_file: &Path,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        let mode = IssuanceMode::DirectCsr {
            csr_path: csr_file.to_path_buf(),
        };
        let storage = LocalStorage::new(crt_file).with_force(options.force);
        self.issue(mode, "", &storage, options)
    }

    /// Runs one issuance in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the `IssuanceError` of the first failing stage.
    pub fn issue(
        &self,
        mode: IssuanceMode,
        subject: &str,
        storage: &LocalStorage,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        let subject = subject.trim();
        tracing::debug!(mode = mode.name(), "starting issuance");
        match mode {
            IssuanceMode::Online { token } => {
                self.issue_online(subject, token, storage, options)
            }
            IssuanceMode::Offline { config_path } => {
                Self::issue_offline(subject, config_path, storage, options)
            }
            IssuanceMode::DirectCsr { csr_path } => {
                self.issue_from_csr(&csr_path, storage, options)
            }
        }
    }

    fn issue_online(
        &self,
        subject: &str,
        token: Option<String>,
        storage: &LocalStorage,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        ensure_token_without_sans(token.as_deref(), &options.sans)?;
        let validity = options.validity()?;
        storage.ensure_writable()?;
        let token = match token {
            Some(token) => token,
            None => self.acquire_token(subject, &options.sans, validity, &options.authority)?,
        };

        let claims = token.parse_claims()?;
        let built = request::from_token(&claims)?;
        ensure_hostname_matches(subject, &built.csr.common_name)?;

        let issued = IssuanceClient::new(&self.connector, options.authority.clone())
            .sign(&built.csr, &token, validity)?;
        storage.store(&issued.into_bundle(built.private_key_pem))
    }

    fn issue_offline(
        subject: &str,
        config_path: Option<PathBuf>,
        storage: &LocalStorage,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        let offline = OfflineIssuance::new(config_path);
        offline.config_path()?;
        let validity = options.validity()?;
        storage.ensure_writable()?;
        if options.sans.iter().any(|san| !san.trim().is_empty()) {
            tracing::warn!("offline authority only authorizes the subject; --san is ignored");
        }
        let persisted = offline
            .load_config()?
            .generate_token(subject)?
            .build_request()?
            .sign(validity)?
            .persist(storage)?;
        Ok(persisted.into_outcome())
    }

    fn issue_from_csr(
        &self,
        csr_path: &Path,
        storage: &LocalStorage,
        options: &CertificateOptions,
    ) -> Result<StorageOutcome> {
        let built = request::from_file(csr_path)?;
        let validity = options.validity()?;
        storage.ensure_writable()?;
        let token = match options.token() {
            Some(token) => token.to_owned(),
            None => self.acquire_token(
                &built.csr.common_name,
                &options.sans,
                validity,
                &options.authority,
            )?,
        };
        let issued = IssuanceClient::new(&self.connector, options.authority.clone())
            .sign(&built.csr, &token, validity)?;
        storage.store(&issued.into_bundle(None))
    }

    fn acquire_token(
        &self,
        subject: &str,
        sans: &[String],
        validity: Validity,
        authority: &AuthorityOptions,
    ) -> Result<String> {
        let ca_url = authority.require_ca_url()?;
        let root = authority.require_root()?;
        if subject.is_empty() {
            return Err(IssuanceError::invalid_option(
                "subject",
                subject,
                "a subject is required to request a token",
            ));
        }
        let issuer = self
            .issuer
            .as_deref()
            .ok_or(IssuanceError::MissingRequiredOption("token"))?;
        tracing::info!(%ca_url, subject, "requesting authorization token");
        issuer.issue_token(&TokenRequest {
            subject: subject.to_owned(),
            sans: sans.to_vec(),
            ca_url,
            root,
            validity,
        })
    }
}

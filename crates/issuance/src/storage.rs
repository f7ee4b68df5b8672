use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::{IssuanceError, Result};

/// Leaf and authority certificates, plus the key when one was generated.
#[derive(Clone)]
pub struct CertificateBundle {
    leaf_pem: String,
    authority_pem: String,
    private_key_pem: Option<Zeroizing<String>>,
}

impl CertificateBundle {
    #[must_use]
    pub fn new(
        leaf_pem: impl Into<String>,
        authority_pem: impl Into<String>,
        private_key_pem: Option<Zeroizing<String>>,
    ) -> Self {
        Self {
            leaf_pem: leaf_pem.into(),
            authority_pem: authority_pem.into(),
            private_key_pem,
        }
    }

    #[must_use]
    pub fn leaf_pem(&self) -> &str {
        &self.leaf_pem
    }

    #[must_use]
    pub fn authority_pem(&self) -> &str {
        &self.authority_pem
    }

    #[must_use]
    pub fn private_key_pem(&self) -> Option<&str> {
        self.private_key_pem.as_deref().map(String::as_str)
    }

    /// Leaf then authority, one PEM block each, newline terminated.
    #[must_use]
    pub fn certificate_chain_pem(&self) -> String {
        let mut output = String::new();
        for block in [&self.leaf_pem, &self.authority_pem] {
            output.push_str(block.trim());
            output.push('\n');
        }
        output
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("leaf_pem", &self.leaf_pem)
            .field("authority_pem", &self.authority_pem)
            .field("has_private_key", &self.private_key_pem.is_some())
            .finish()
    }
}

/// Paths written by [`LocalStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOutcome {
    pub certificate_path: PathBuf,
    pub private_key_path: Option<PathBuf>,
}

/// Writes bundles to local files readable only by the owner.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    certificate_path: PathBuf,
    private_key_path: Option<PathBuf>,
    force: bool,
}

impl LocalStorage {
    #[must_use]
    pub fn new(certificate_path: impl Into<PathBuf>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            private_key_path: None,
            force: false,
        }
    }

    /// Destination for the private key of bundles that carry one.
    #[must_use]
    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Allows replacing existing files.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Checks that no destination would be overwritten without `force`.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` naming the existing file.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.force {
            return Ok(());
        }
        for path in std::iter::once(&self.certificate_path).chain(&self.private_key_path) {
            if path.exists() {
                return Err(IssuanceError::Configuration(format!(
                    "{} already exists; use --force to overwrite it",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Writes the certificate chain, then the key.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` when a destination exists
    /// without `force` or a key has nowhere to go, and
    /// `IssuanceError::Persistence` when a write fails.
    pub fn store(&self, bundle: &CertificateBundle) -> Result<StorageOutcome> {
        self.ensure_writable()?;
        let key_target = match (bundle.private_key_pem(), &self.private_key_path) {
            (Some(key), Some(path)) => Some((key, path)),
            (Some(_), None) => {
                return Err(IssuanceError::Configuration(
                    "a private key was generated but no key file was given".to_owned(),
                ))
            }
            (None, _) => None,
        };

        write_private(&self.certificate_path, &bundle.certificate_chain_pem(), self.force)?;
        tracing::info!(path = %self.certificate_path.display(), "certificate written");

        let private_key_path = match key_target {
            Some((key, path)) => {
                let mut normalized = Zeroizing::new(key.trim().to_owned());
                normalized.push('\n');
                write_private(path, &normalized, self.force)?;
                tracing::info!(path = %path.display(), "private key written");
                Some(path.clone())
            }
            None => None,
        };

        Ok(StorageOutcome {
            certificate_path: self.certificate_path.clone(),
            private_key_path,
        })
    }
}

fn write_private(path: &Path, contents: &str, force: bool) -> Result<()> {
    let persistence = |source| IssuanceError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(persistence)?;
        }
    }
    let mut file = open_private(path, force).map_err(persistence)?;
    file.write_all(contents.as_bytes()).map_err(persistence)?;
    file.sync_all().map_err(persistence)?;
    Ok(())
}

fn open_private(path: &Path, force: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        // `mode` only applies on creation; a forced overwrite keeps the old bits.
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        Ok(file)
    }
    #[cfg(not(unix))]
    {
        options.open(path)
    }
}

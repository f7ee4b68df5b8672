use std::path::PathBuf;

use certflow_jwt::JwtError;
use certflow_x509::X509Error;
use thiserror::Error;

/// Result type for issuance operations.
pub type Result<T> = std::result::Result<T, IssuanceError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Issuance errors. Every variant is terminal for the call that raised it.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// A required option was not supplied.
    #[error("missing required option '--{0}'")]
    MissingRequiredOption(&'static str),
    /// An option value could not be interpreted.
    #[error("invalid value '{value}' for option '--{option}': {reason}")]
    InvalidOptionValue {
        option: &'static str,
        value: String,
        reason: String,
    },
    /// Two options cannot be combined.
    #[error("option '--{0}' is incompatible with '--{1}'")]
    IncompatibleOptions(&'static str, &'static str),
    /// Two options express the same intent in conflicting ways.
    #[error("options '--{0}' and '--{1}' are mutually exclusive")]
    MutuallyExclusiveOptions(&'static str, &'static str),
    /// Input files or settings are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The authorization token is malformed.
    #[error("error parsing token")]
    TokenParse(#[from] JwtError),
    /// Two identities that must agree do not.
    #[error("{left_label} '{left}' and {right_label} '{right}' do not match")]
    SubjectMismatch {
        left_label: &'static str,
        left: String,
        right_label: &'static str,
        right: String,
    },
    /// The authority could not be reached or authenticated.
    #[error("transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<BoxError>,
    },
    /// The authority declined to sign.
    #[error("authority rejected the request ({status}): {message}")]
    AuthorityRejection { status: u16, message: String },
    /// Certificate material returned by the authority is unusable.
    #[error("invalid certificate encoding: {context}")]
    Encoding {
        context: String,
        #[source]
        source: Option<X509Error>,
    },
    /// A CSR was expected but the PEM holds something else.
    #[error("error parsing {}: file is not a certificate request", path.display())]
    NotACertificateRequest { path: PathBuf },
    /// Writing an artifact failed.
    #[error("error writing {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IssuanceError {
    /// Whether the caller must correct its input before retrying.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredOption(_)
                | Self::InvalidOptionValue { .. }
                | Self::IncompatibleOptions(..)
                | Self::MutuallyExclusiveOptions(..)
                | Self::Configuration(_)
        )
    }

    pub(crate) fn transport(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn encoding(context: impl Into<String>, source: X509Error) -> Self {
        Self::Encoding {
            context: context.into(),
            source: Some(source),
        }
    }

    pub(crate) fn invalid_option(
        option: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOptionValue {
            option,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_class_covers_option_errors() {
        assert!(IssuanceError::MissingRequiredOption("ca-url").is_configuration());
        assert!(IssuanceError::MutuallyExclusiveOptions("token", "san").is_configuration());
        assert!(IssuanceError::IncompatibleOptions("offline", "token").is_configuration());
        assert!(!IssuanceError::AuthorityRejection {
            status: 401,
            message: "unauthorized".into()
        }
        .is_configuration());
    }

    #[test]
    fn mismatch_names_both_identities() {
        let err = IssuanceError::SubjectMismatch {
            left_label: "token subject",
            left: "a.example.com".into(),
            right_label: "CSR CommonName",
            right: "b.example.com".into(),
        };
        assert_eq!(
            err.to_string(),
            "token subject 'a.example.com' and CSR CommonName 'b.example.com' do not match"
        );
    }
}

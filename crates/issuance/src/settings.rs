use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IssuanceError, Result};
use crate::transport::HttpConnector;
use crate::trust::AuthorityOptions;

const BASE_DIR_NAME: &str = ".certflow";

/// Defaults read from the environment. Command line flags take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `CERTFLOW_PATH`, else `$HOME/.certflow`. `None` when neither is set.
    pub base_path: Option<PathBuf>,
    /// `CERTFLOW_CA_URL`
    pub ca_url: Option<String>,
    /// `CERTFLOW_ROOT`
    pub root: Option<PathBuf>,
    /// `CERTFLOW_HTTP_TIMEOUT_SECS`
    pub http_timeout: Option<Duration>,
}

impl Settings {
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` for values that cannot be used.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(IssuanceError::Configuration(format!(
                "{key} contains non-unicode characters"
            ))),
        })
    }

    /// Builds settings from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `IssuanceError::Configuration` for values that cannot be used,
    /// or whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let non_empty = |key: &str| -> Result<Option<String>> {
            Ok(lookup(key)?
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()))
        };

        let base_path = match non_empty("CERTFLOW_PATH")? {
            Some(path) => Some(PathBuf::from(path)),
            None => non_empty("HOME")?.map(|home| PathBuf::from(home).join(BASE_DIR_NAME)),
        };
        let http_timeout = match non_empty("CERTFLOW_HTTP_TIMEOUT_SECS")? {
            None => None,
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|err| {
                    IssuanceError::Configuration(format!(
                        "CERTFLOW_HTTP_TIMEOUT_SECS is not a number: {err}"
                    ))
                })?;
                if secs == 0 {
                    return Err(IssuanceError::Configuration(
                        "CERTFLOW_HTTP_TIMEOUT_SECS must be greater than 0".to_owned(),
                    ));
                }
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            base_path,
            ca_url: non_empty("CERTFLOW_CA_URL")?,
            root: non_empty("CERTFLOW_ROOT")?.map(PathBuf::from),
            http_timeout,
        })
    }

    /// Well-known root location under the base path, if there is one.
    #[must_use]
    pub fn default_root(&self) -> Option<PathBuf> {
        self.base_path
            .as_ref()
            .map(|base| base.join("certs").join("root_ca.crt"))
    }

    /// Authority options with flag values layered over the environment.
    #[must_use]
    pub fn authority_options(
        &self,
        ca_url: Option<String>,
        root: Option<PathBuf>,
    ) -> AuthorityOptions {
        AuthorityOptions {
            ca_url: ca_url.or_else(|| self.ca_url.clone()),
            root: root.or_else(|| self.root.clone()),
            default_root: self.default_root(),
        }
    }

    #[must_use]
    pub const fn connector(&self) -> HttpConnector {
        HttpConnector::new().with_timeout(self.http_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        Settings::from_lookup(|key| Ok(vars.get(key).cloned()))
    }

    #[test]
    fn base_path_defaults_under_home() {
        let settings = settings(&[("HOME", "/home/ops")]).expect("settings");
        assert_eq!(settings.base_path, Some(PathBuf::from("/home/ops/.certflow")));
        assert_eq!(
            settings.default_root(),
            Some(PathBuf::from("/home/ops/.certflow/certs/root_ca.crt"))
        );
        assert_eq!(settings.ca_url, None);
        assert_eq!(settings.http_timeout, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = settings(&[
            ("HOME", "/home/ops"),
            ("CERTFLOW_PATH", "/srv/pki"),
            ("CERTFLOW_CA_URL", "https://ca.internal:9000"),
            ("CERTFLOW_ROOT", "/srv/pki/root.crt"),
            ("CERTFLOW_HTTP_TIMEOUT_SECS", "15"),
        ])
        .expect("settings");
        assert_eq!(settings.base_path, Some(PathBuf::from("/srv/pki")));
        assert_eq!(settings.http_timeout, Some(Duration::from_secs(15)));

        let options = settings.authority_options(None, Some(PathBuf::from("/flag/root.crt")));
        assert_eq!(options.ca_url.as_deref(), Some("https://ca.internal:9000"));
        assert_eq!(options.root, Some(PathBuf::from("/flag/root.crt")));
        assert_eq!(
            options.default_root,
            Some(PathBuf::from("/srv/pki/certs/root_ca.crt"))
        );
    }

    #[test]
    fn rejects_bad_timeouts() {
        for raw in ["soon", "0", "-1"] {
            let err = settings(&[("HOME", "/h"), ("CERTFLOW_HTTP_TIMEOUT_SECS", raw)])
                .expect_err(raw);
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn explicit_root_works_without_a_base_path() {
        let settings = settings(&[
            ("CERTFLOW_ROOT", "/etc/pki/root.crt"),
            ("CERTFLOW_CA_URL", "https://ca.internal"),
        ])
        .expect("settings");
        assert_eq!(settings.base_path, None);
        assert_eq!(settings.default_root(), None);

        let options = settings.authority_options(None, None);
        assert_eq!(options.default_root, None);
        assert_eq!(
            options.require_root().expect("root"),
            PathBuf::from("/etc/pki/root.crt")
        );
    }

    #[test]
    fn missing_root_is_reported_as_a_missing_option() {
        let settings = settings(&[]).expect("settings");
        let err = settings
            .authority_options(Some("https://ca.internal".to_owned()), None)
            .require_root()
            .expect_err("no root");
        assert!(matches!(err, IssuanceError::MissingRequiredOption("root")));
    }
}

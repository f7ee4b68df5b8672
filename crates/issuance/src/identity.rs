//! Cross-checks between the caller's subject, the token and the CSR.

use crate::error::{IssuanceError, Result};

/// The CSR common name must be the hostname the caller asked for.
///
/// # Errors
///
/// Returns `IssuanceError::SubjectMismatch` naming both values.
pub fn ensure_hostname_matches(hostname: &str, csr_common_name: &str) -> Result<()> {
    if same_identity(hostname, csr_common_name) {
        return Ok(());
    }
    Err(IssuanceError::SubjectMismatch {
        left_label: "token subject",
        left: csr_common_name.to_owned(),
        right_label: "hostname",
        right: hostname.to_owned(),
    })
}

/// The token must have been issued for the CSR's common name.
///
/// # Errors
///
/// Returns `IssuanceError::SubjectMismatch` naming both values.
pub fn ensure_token_subject_matches(token_subject: &str, csr_common_name: &str) -> Result<()> {
    if same_identity(token_subject, csr_common_name) {
        return Ok(());
    }
    Err(IssuanceError::SubjectMismatch {
        left_label: "token subject",
        left: token_subject.to_owned(),
        right_label: "CSR CommonName",
        right: csr_common_name.to_owned(),
    })
}

/// A token already fixes the names it authorizes; extra SANs are ambiguous.
///
/// # Errors
///
/// Returns `IssuanceError::MutuallyExclusiveOptions` when both are given.
pub fn ensure_token_without_sans(token: Option<&str>, sans: &[String]) -> Result<()> {
    let has_token = token.is_some_and(|token| !token.trim().is_empty());
    let has_sans = sans.iter().any(|san| !san.trim().is_empty());
    if has_token && has_sans {
        return Err(IssuanceError::MutuallyExclusiveOptions("token", "san"));
    }
    Ok(())
}

/// The offline authority mints its own token, so a supplied one cannot be used.
///
/// # Errors
///
/// Returns `IssuanceError::IncompatibleOptions` when both are requested.
pub fn ensure_offline_without_token(offline: bool, token: Option<&str>) -> Result<()> {
    if offline && token.is_some_and(|token| !token.trim().is_empty()) {
        return Err(IssuanceError::IncompatibleOptions("offline", "token"));
    }
    Ok(())
}

fn same_identity(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_compare_case_insensitively() {
        for (left, right) in [
            ("internal.example.com", "internal.example.com"),
            ("Internal.Example.COM", "internal.example.com"),
            ("ÄRGER.example", "ärger.example"),
        ] {
            assert!(ensure_hostname_matches(left, right).is_ok());
            assert!(ensure_token_subject_matches(left, right).is_ok());
        }
    }

    #[test]
    fn mismatch_is_reported_with_both_names() {
        let err = ensure_token_subject_matches("a.example.com", "b.example.com")
            .expect_err("mismatch");
        assert!(matches!(
            &err,
            IssuanceError::SubjectMismatch { left, right, .. }
                if left == "a.example.com" && right == "b.example.com"
        ));

        let err = ensure_hostname_matches("host.example.com", "other.example.com")
            .expect_err("mismatch");
        assert_eq!(
            err.to_string(),
            "token subject 'other.example.com' and hostname 'host.example.com' do not match"
        );
    }

    #[test]
    fn token_and_sans_are_exclusive() {
        let sans = vec!["1.1.1.1".to_owned()];
        assert!(matches!(
            ensure_token_without_sans(Some("a.b.c"), &sans),
            Err(IssuanceError::MutuallyExclusiveOptions("token", "san"))
        ));
        assert!(ensure_token_without_sans(None, &sans).is_ok());
        assert!(ensure_token_without_sans(Some("a.b.c"), &[]).is_ok());
        assert!(ensure_token_without_sans(Some(""), &sans).is_ok());
    }

    #[test]
    fn offline_rejects_explicit_token() {
        assert!(matches!(
            ensure_offline_without_token(true, Some("a.b.c")),
            Err(IssuanceError::IncompatibleOptions("offline", "token"))
        ));
        assert!(ensure_offline_without_token(true, None).is_ok());
        assert!(ensure_offline_without_token(false, Some("a.b.c")).is_ok());
    }
}

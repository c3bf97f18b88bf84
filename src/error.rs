use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

/// Why an operation on the credentials manager failed.
#[derive(Debug, Clone, Error)]
pub enum CredentialsError {
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("MFA needed. mfa_serial:{0}")]
    MfaNeeded(String),

    #[error("missing profile: default")]
    MissingDefaultProfile,

    #[error("no source session has been established")]
    NotAuthenticated,

    #[error("profile has no static credentials: {0}")]
    MissingStaticCredentials(String),

    #[error("identity service call failed: {0:#}")]
    Identity(Arc<anyhow::Error>),

    #[error("identity service call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl From<anyhow::Error> for CredentialsError {
    fn from(e: anyhow::Error) -> Self {
        CredentialsError::Identity(Arc::new(e))
    }
}

/// A [`CredentialsError`] tagged with what the caller may do about it.
///
/// `Fatal` errors must end the process: the failure involved a consumed MFA
/// code or a missing non-default base profile, and retrying is unsafe.
/// `Recoverable` errors can be retried, usually after prompting for an MFA
/// code or choosing another profile.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    #[error("fatal: {0}")]
    Fatal(CredentialsError),

    #[error(transparent)]
    Recoverable(CredentialsError),
}

impl ManagerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ManagerError::Fatal(_))
    }

    pub fn reason(&self) -> &CredentialsError {
        match self {
            ManagerError::Fatal(e) | ManagerError::Recoverable(e) => e,
        }
    }

    /// The MFA device that has to supply a code before a retry can succeed.
    pub fn mfa_needed(&self) -> Option<&str> {
        match self {
            ManagerError::Recoverable(CredentialsError::MfaNeeded(serial)) => Some(serial),
            _ => None,
        }
    }

    pub(crate) fn escalate(self) -> Self {
        ManagerError::Fatal(self.into_reason())
    }

    fn into_reason(self) -> CredentialsError {
        match self {
            ManagerError::Fatal(e) | ManagerError::Recoverable(e) => e,
        }
    }
}

impl From<CredentialsError> for ManagerError {
    fn from(e: CredentialsError) -> Self {
        ManagerError::Recoverable(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_are_recoverable() {
        let e = ManagerError::from(CredentialsError::UnknownProfile("dev".to_string()));
        assert!(!e.is_fatal());
        assert_eq!(e.to_string(), "unknown profile: dev");
    }

    #[test]
    fn escalation_keeps_the_reason() {
        let e = ManagerError::from(CredentialsError::MissingDefaultProfile).escalate();
        assert!(e.is_fatal());
        assert!(matches!(e.reason(), CredentialsError::MissingDefaultProfile));
        assert_eq!(e.to_string(), "fatal: missing profile: default");
    }

    #[test]
    fn only_recoverable_mfa_errors_ask_for_a_code() {
        let serial = "arn:aws:iam::123456789012:mfa/alice".to_string();
        let recoverable = ManagerError::from(CredentialsError::MfaNeeded(serial.clone()));
        assert_eq!(recoverable.mfa_needed(), Some(serial.as_str()));

        let fatal = recoverable.escalate();
        assert_eq!(fatal.mfa_needed(), None);
    }

    #[test]
    fn identity_errors_show_the_whole_chain() {
        let e = CredentialsError::from(
            anyhow::anyhow!("AccessDenied").context("assume-role failed"),
        );
        assert_eq!(
            e.to_string(),
            "identity service call failed: assume-role failed: AccessDenied"
        );
    }
}

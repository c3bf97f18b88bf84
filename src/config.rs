use std::time::Duration;

use crate::error::CredentialsError;

pub mod defaults {
    use std::time::Duration;

    pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10);
    pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(600);
    pub const SESSION_DURATION: Duration = Duration::from_secs(10 * 3600);
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const SESSION_NAME: &str = "rolekeeper";
}

/// Tunables of the credentials manager and its refresher.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often the refresher checks the active credentials.
    pub refresh_interval: Duration,
    /// Remaining lifetime below which the active role is re-assumed.
    pub refresh_threshold: Duration,
    /// Lifetime requested for source sessions.
    pub session_duration: Duration,
    /// Upper bound on a single identity service call.
    pub call_timeout: Duration,
    /// Role session name used when neither the role nor its source names one.
    pub default_session_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            refresh_interval: defaults::REFRESH_INTERVAL,
            refresh_threshold: defaults::REFRESH_THRESHOLD,
            session_duration: defaults::SESSION_DURATION,
            call_timeout: defaults::CALL_TIMEOUT,
            default_session_name: defaults::SESSION_NAME.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Rejects settings the refresher and the identity calls cannot run with.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.refresh_interval.is_zero() {
            return Err(CredentialsError::InvalidConfig(
                "refresh interval must be non-zero",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(CredentialsError::InvalidConfig("call timeout must be non-zero"));
        }
        Ok(())
    }

    pub(crate) fn refresh_threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_threshold).unwrap_or(chrono::Duration::MAX)
    }
}

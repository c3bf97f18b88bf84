#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use rolekeeper::identity::{AssumeRoleRequest, IdentityService, SessionTokenRequest};
use rolekeeper::profile::{Profile, ProfileSet};
use rolekeeper::Credentials;

pub const MFA_SERIAL: &str = "arn:aws:iam::123456789012:mfa/alice";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exchange {
        access_key_id: String,
        mfa_code: Option<String>,
    },
    AssumeRole {
        role_arn: String,
        role_session_name: String,
        source_access_key_id: String,
        mfa_code: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct Settings {
    session_lifetime: Duration,
    role_lifetime: Duration,
    fail_exchange: bool,
    fail_assume: bool,
    delay: Option<std::time::Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            session_lifetime: Duration::hours(10),
            role_lifetime: Duration::hours(1),
            fail_exchange: false,
            fail_assume: false,
            delay: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<Call>>,
    settings: Mutex<Settings>,
    issued: AtomicUsize,
}

/// Records every call and hands out credentials with configurable lifetimes.
#[derive(Clone, Default)]
pub struct FakeSts {
    inner: Arc<Inner>,
}

impl FakeSts {
    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn exchanges(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Exchange { .. }))
            .count()
    }

    pub fn assumptions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::AssumeRole { .. }))
            .count()
    }

    pub fn set_session_lifetime(&self, lifetime: Duration) {
        self.inner.settings.lock().unwrap().session_lifetime = lifetime;
    }

    pub fn set_role_lifetime(&self, lifetime: Duration) {
        self.inner.settings.lock().unwrap().role_lifetime = lifetime;
    }

    pub fn fail_exchange(&self, fail: bool) {
        self.inner.settings.lock().unwrap().fail_exchange = fail;
    }

    pub fn fail_assume(&self, fail: bool) {
        self.inner.settings.lock().unwrap().fail_assume = fail;
    }

    pub fn delay(&self, delay: std::time::Duration) {
        self.inner.settings.lock().unwrap().delay = Some(delay);
    }

    fn settings(&self) -> Settings {
        self.inner.settings.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn issue(&self, prefix: &str, lifetime: Duration) -> Credentials {
        let n = self.inner.issued.fetch_add(1, Ordering::SeqCst);
        Credentials {
            access_key_id: format!("{}-{}", prefix, n),
            secret_access_key: format!("secret-{}", n),
            session_token: format!("token-{}", n),
            expiration: Utc::now() + lifetime,
        }
    }
}

#[async_trait]
impl IdentityService for FakeSts {
    type Handle = Credentials;

    async fn exchange_for_session(
        &self,
        request: SessionTokenRequest<'_>,
    ) -> anyhow::Result<Credentials> {
        let settings = self.settings();
        if let Some(delay) = settings.delay {
            tokio::time::sleep(delay).await;
        }

        self.record(Call::Exchange {
            access_key_id: request.static_credentials.access_key_id.to_string(),
            mfa_code: request.mfa_code.map(|s| s.to_string()),
        });
        if settings.fail_exchange {
            anyhow::bail!("MultiFactorAuthentication failed with invalid MFA one time pass code.");
        }
        Ok(self.issue("ASIA-SESSION", settings.session_lifetime))
    }

    fn bind(
        &self,
        credentials: &Credentials,
        _region_name: Option<&str>,
    ) -> anyhow::Result<Self::Handle> {
        Ok(credentials.clone())
    }

    async fn assume_role(
        &self,
        handle: &Self::Handle,
        request: AssumeRoleRequest<'_>,
    ) -> anyhow::Result<Credentials> {
        let settings = self.settings();
        if let Some(delay) = settings.delay {
            tokio::time::sleep(delay).await;
        }

        self.record(Call::AssumeRole {
            role_arn: request.role_arn.to_string(),
            role_session_name: request.role_session_name.to_string(),
            source_access_key_id: handle.access_key_id.clone(),
            mfa_code: request.mfa_code.map(|s| s.to_string()),
        });
        if settings.fail_assume {
            anyhow::bail!("AccessDenied: not authorized to perform sts:AssumeRole");
        }
        Ok(self.issue("ASIA-ROLE", settings.role_lifetime))
    }
}

pub fn root(name: &str) -> Profile {
    Profile {
        name: name.to_string(),
        region_name: Some("us-west-2".to_string()),
        aws_access_key_id: Some(format!("AKID-{}", name)),
        aws_secret_access_key: Some(format!("secret-{}", name)),
        ..Profile::default()
    }
}

pub fn role(name: &str, source: &str) -> Profile {
    Profile {
        name: name.to_string(),
        source_profile_name: Some(source.to_string()),
        role_arn: Some(role_arn(name)),
        ..Profile::default()
    }
}

pub fn role_arn(name: &str) -> String {
    format!("arn:aws:iam::123456789012:role/{}", name)
}

pub fn with_mfa(profile: Profile) -> Profile {
    Profile {
        mfa_serial: Some(MFA_SERIAL.to_string()),
        ..profile
    }
}

pub fn profiles<I: IntoIterator<Item = Profile>>(profiles: I) -> ProfileSet {
    profiles.into_iter().collect()
}

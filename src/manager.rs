use std::future::Future;

use chrono::Utc;
use rolekeeper_schema::credentials::Credentials;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{CredentialsError, ManagerError, ManagerResult};
use crate::identity::{AssumeRoleRequest, IdentityService, SessionTokenRequest};
use crate::profile::{Profile, ProfileSet, DEFAULT_PROFILE};

pub mod refresh;

pub use refresh::{RefreshOutcome, Refresher};

/// The authenticated base of the role chain.
struct SourceSession<H> {
    profile: Profile,
    credentials: Credentials,
    handle: H,
}

impl<H> SourceSession<H> {
    fn name(&self) -> &str {
        self.profile.name()
    }

    fn is_expired(&self) -> bool {
        self.credentials.is_expired_at(Utc::now())
    }
}

struct ManagerState<H> {
    source: Option<SourceSession<H>>,
    role: String,
    credentials: Option<Credentials>,
    last_error: Option<ManagerError>,
    last_refresh_error: Option<ManagerError>,
}

impl<H> ManagerState<H> {
    fn fatal_error(&self) -> Option<ManagerError> {
        self.last_error.as_ref().filter(|e| e.is_fatal()).cloned()
    }

    fn needs_source(&self, source_name: &str) -> bool {
        self.last_error.is_some()
            || self
                .source
                .as_ref()
                .map(|s| s.name() != source_name || s.is_expired())
                .unwrap_or(true)
    }

    fn set_credentials(&mut self, credentials: Credentials, role: &str) {
        self.credentials = Some(credentials);
        self.role = role.to_string();
    }
}

/// What a role assumption is aimed at.
#[derive(Debug, Clone, Copy, Default)]
struct RoleTarget<'a> {
    role_arn: Option<&'a str>,
    mfa_serial: Option<&'a str>,
    session_name: Option<&'a str>,
    external_id: Option<&'a str>,
    duration_seconds: Option<u32>,
}

impl<'a> From<&'a Profile> for RoleTarget<'a> {
    fn from(profile: &'a Profile) -> Self {
        RoleTarget {
            role_arn: profile.role_arn(),
            mfa_serial: profile.mfa_serial(),
            session_name: profile.role_session_name(),
            external_id: profile.external_id(),
            duration_seconds: profile.duration_seconds(),
        }
    }
}

/// A snapshot of the source session taken so the lock is not held during
/// a role assumption.
struct SourceSnapshot<H> {
    role_arn: Option<String>,
    role_session_name: Option<String>,
    credentials: Credentials,
    handle: H,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Keeps one set of temporary credentials alive for the active role.
///
/// The manager authenticates a source profile with `GetSessionToken`, uses
/// that session to assume roles, and hands out copies of the active
/// credentials. A source authentication failure latches: until a later
/// authentication succeeds, [`get_credentials`](Self::get_credentials)
/// reports it. Fatal failures never unlatch.
pub struct CredentialsManager<I: IdentityService> {
    profiles: ProfileSet,
    identity: I,
    config: ManagerConfig,
    state: Mutex<ManagerState<I::Handle>>,
}

impl<I: IdentityService> CredentialsManager<I> {
    pub fn new(profiles: ProfileSet, identity: I, config: ManagerConfig) -> Self {
        CredentialsManager {
            profiles,
            identity,
            config,
            state: Mutex::new(ManagerState {
                source: None,
                role: DEFAULT_PROFILE.to_string(),
                credentials: None,
                last_error: None,
                last_refresh_error: None,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Name of the role the active credentials belong to.
    pub async fn role(&self) -> String {
        self.state.lock().await.role.clone()
    }

    /// Name of the profile backing the current source session.
    pub async fn source_profile_name(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.source.as_ref().map(|s| s.name().to_string())
    }

    /// The error left by the last failed background refresh, if any.
    pub async fn last_refresh_error(&self) -> Option<ManagerError> {
        self.state.lock().await.last_refresh_error.clone()
    }

    /// Returns a copy of the active credentials.
    pub async fn get_credentials(&self) -> ManagerResult<Credentials> {
        let state = self.state.lock().await;
        if let Some(e) = state.last_error.as_ref() {
            return Err(e.clone());
        }

        match state.credentials.as_ref() {
            Some(credentials) => Ok(credentials.clone()),
            None if !self.profiles.has_default() => {
                Err(CredentialsError::MissingDefaultProfile.into())
            }
            None => Err(CredentialsError::NotAuthenticated.into()),
        }
    }

    /// Authenticates `name` as the new source profile and makes it the
    /// active role.
    ///
    /// The exchange runs with the state locked, so either the whole source
    /// session is replaced or nothing but the latched error changes.
    pub async fn set_source_profile(
        &self,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<()> {
        let mut state = self.state.lock().await;
        let credentials = self.replace_source(&mut state, name, mfa_code).await?;
        state.set_credentials(credentials, name);
        Ok(())
    }

    /// Fetches credentials for the role profile `name` without changing the
    /// active role.
    ///
    /// Fails with the latched error, if any. A source session may still be
    /// renewed or switched along the way.
    pub async fn retrieve_role(
        &self,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        if let Some(e) = self.state.lock().await.last_error.clone() {
            return Err(e);
        }
        self.role_credentials(name, mfa_code).await
    }

    /// Assumes the role profile `name` and makes it the active role.
    ///
    /// A recoverable latched error is repaired by authenticating the role's
    /// source again.
    pub async fn assume_role(
        &self,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        if let Some(e) = self.state.lock().await.fatal_error() {
            return Err(e);
        }

        let credentials = self.role_credentials(name, mfa_code).await?;
        info!(
            "assumed role. role:{}, expiration:{}",
            name,
            credentials.expiration()
        );
        self.commit(name, credentials.clone()).await;
        Ok(credentials)
    }

    /// Fetches credentials for `role_arn` through the current source
    /// session without changing the active role.
    pub async fn retrieve_role_arn(
        &self,
        role_arn: &str,
        mfa_serial: Option<&str>,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        let mut mfa_code = non_empty(mfa_code);
        let expired_source = {
            let state = self.state.lock().await;
            if let Some(e) = state.last_error.as_ref() {
                return Err(e.clone());
            }
            match state.source.as_ref() {
                Some(source) if source.is_expired() => Some(source.name().to_string()),
                Some(_) => None,
                None => return Err(CredentialsError::NotAuthenticated.into()),
            }
        };

        if let Some(source_name) = expired_source {
            debug!("source session expired. profile:{}", source_name);
            self.renew_source(&source_name, mfa_code).await?;
            if self.requires_mfa(&source_name) {
                mfa_code = None;
            }
        }

        let target = RoleTarget {
            role_arn: Some(role_arn),
            mfa_serial: non_empty(mfa_serial),
            ..RoleTarget::default()
        };
        self.retrieve(target, mfa_code).await
    }

    /// Assumes `role_arn` and stores the result as the active role `name`.
    pub async fn assume_role_arn(
        &self,
        name: &str,
        role_arn: &str,
        mfa_serial: Option<&str>,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        let credentials = self.retrieve_role_arn(role_arn, mfa_serial, mfa_code).await?;
        info!(
            "assumed role. role:{}, role_arn:{}, expiration:{}",
            name,
            role_arn,
            credentials.expiration()
        );
        self.commit(name, credentials.clone()).await;
        Ok(credentials)
    }

    async fn commit(&self, role: &str, credentials: Credentials) {
        self.state.lock().await.set_credentials(credentials, role);
    }

    fn requires_mfa(&self, profile_name: &str) -> bool {
        self.profiles
            .get_profile(profile_name)
            .and_then(|p| p.mfa_serial())
            .is_some()
    }

    async fn role_credentials(
        &self,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        let mfa_code = non_empty(mfa_code);
        let profile = self
            .profiles
            .get_profile(name)
            .ok_or_else(|| CredentialsError::UnknownProfile(name.to_string()))?;

        let consumed = self.ensure_source(profile.source_name(), mfa_code).await?;
        let mfa_code = if consumed { None } else { mfa_code };

        self.retrieve(RoleTarget::from(profile), mfa_code).await
    }

    /// Re-authenticates `source_name` unless it already backs a live
    /// session. Returns whether the MFA code was spent doing so.
    async fn ensure_source(
        &self,
        source_name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<bool> {
        if !self.state.lock().await.needs_source(source_name) {
            return Ok(false);
        }

        debug!("source session needs authentication. profile:{}", source_name);
        self.renew_source(source_name, mfa_code).await?;
        Ok(mfa_code.is_some() && self.requires_mfa(source_name))
    }

    /// Replaces the source session, leaving the active role alone.
    async fn renew_source(&self, name: &str, mfa_code: Option<&str>) -> ManagerResult<()> {
        let mut state = self.state.lock().await;
        self.replace_source(&mut state, name, mfa_code).await?;
        Ok(())
    }

    /// Authenticates `name` and installs it as the source session while the
    /// caller holds the lock. Returns the new session credentials.
    async fn replace_source(
        &self,
        state: &mut ManagerState<I::Handle>,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        if let Some(e) = state.fatal_error() {
            return Err(e);
        }
        state.last_error = None;

        info!("setting source profile: {}", name);
        match self.authenticate(name, non_empty(mfa_code)).await {
            Ok(session) => {
                info!(
                    "source profile authenticated. profile:{}, expiration:{}",
                    name,
                    session.credentials.expiration()
                );
                let credentials = session.credentials.clone();
                state.source = Some(session);
                Ok(credentials)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn snapshot(&self) -> ManagerResult<SourceSnapshot<I::Handle>> {
        let state = self.state.lock().await;
        let source = state
            .source
            .as_ref()
            .ok_or(CredentialsError::NotAuthenticated)?;
        Ok(SourceSnapshot {
            role_arn: source.profile.role_arn().map(|s| s.to_string()),
            role_session_name: source.profile.role_session_name().map(|s| s.to_string()),
            credentials: source.credentials.clone(),
            handle: source.handle.clone(),
        })
    }

    async fn retrieve(
        &self,
        target: RoleTarget<'_>,
        mfa_code: Option<&str>,
    ) -> ManagerResult<Credentials> {
        let source = self.snapshot().await?;

        let role_arn = match target.role_arn {
            Some(role_arn) if Some(role_arn) != source.role_arn.as_deref() => role_arn,
            _ => {
                debug!("requested role is the source itself. role_arn:{:?}", target.role_arn);
                return Ok(source.credentials);
            }
        };

        if let (Some(mfa_serial), None) = (target.mfa_serial, mfa_code) {
            return Err(CredentialsError::MfaNeeded(mfa_serial.to_string()).into());
        }

        let role_session_name = target
            .session_name
            .or(source.role_session_name.as_deref())
            .unwrap_or(self.config.default_session_name.as_str());

        let request = AssumeRoleRequest {
            role_arn,
            role_session_name,
            external_id: target.external_id,
            duration_seconds: target.duration_seconds.map(i64::from),
            mfa_serial: target.mfa_serial,
            mfa_code: target.mfa_serial.and(mfa_code),
        };

        info!("assuming role. role_arn:{}", role_arn);
        Ok(self
            .call(self.identity.assume_role(&source.handle, request))
            .await?)
    }

    async fn authenticate(
        &self,
        name: &str,
        mfa_code: Option<&str>,
    ) -> ManagerResult<SourceSession<I::Handle>> {
        let profile = match self.profiles.get_profile(name) {
            Some(profile) => profile,
            None if name == DEFAULT_PROFILE => {
                return Err(CredentialsError::UnknownProfile(name.to_string()).into())
            }
            None => {
                return Err(ManagerError::Fatal(CredentialsError::UnknownProfile(
                    name.to_string(),
                )))
            }
        };

        let mfa_serial = profile.mfa_serial();
        if let (Some(mfa_serial), None) = (mfa_serial, mfa_code) {
            return Err(CredentialsError::MfaNeeded(mfa_serial.to_string()).into());
        }

        let static_credentials = profile
            .static_credentials()
            .ok_or_else(|| CredentialsError::MissingStaticCredentials(name.to_string()))?;

        // A code sent to STS is spent whether or not the exchange succeeds.
        let mfa_code = mfa_serial.and(mfa_code);
        let classify = |e: CredentialsError| {
            let e = ManagerError::from(e);
            if mfa_code.is_some() {
                e.escalate()
            } else {
                e
            }
        };

        let request = SessionTokenRequest {
            static_credentials,
            region_name: profile.region_name(),
            mfa_serial,
            mfa_code,
            duration_seconds: self.config.session_duration.as_secs() as i64,
        };
        let credentials = self
            .call(self.identity.exchange_for_session(request))
            .await
            .map_err(classify)?;
        let handle = self
            .identity
            .bind(&credentials, profile.region_name())
            .map_err(|e| classify(e.into()))?;

        Ok(SourceSession {
            profile: profile.clone(),
            credentials,
            handle,
        })
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, CredentialsError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(r) => r.map_err(CredentialsError::from),
            Err(_) => Err(CredentialsError::Timeout(self.config.call_timeout)),
        }
    }
}

use async_trait::async_trait;
use rolekeeper_schema::credentials::Credentials;

use crate::profile::StaticCredentials;

pub mod rusoto;

/// Input of a `GetSessionToken` exchange.
#[derive(Debug, Clone)]
pub struct SessionTokenRequest<'a> {
    pub static_credentials: StaticCredentials<'a>,
    pub region_name: Option<&'a str>,
    pub mfa_serial: Option<&'a str>,
    pub mfa_code: Option<&'a str>,
    pub duration_seconds: i64,
}

/// Input of an `AssumeRole` call made on behalf of a source session.
#[derive(Debug, Clone)]
pub struct AssumeRoleRequest<'a> {
    pub role_arn: &'a str,
    pub role_session_name: &'a str,
    pub external_id: Option<&'a str>,
    pub duration_seconds: Option<i64>,
    pub mfa_serial: Option<&'a str>,
    pub mfa_code: Option<&'a str>,
}

/// The remote service issuing temporary credentials.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// A client authorized by a source session's temporary credentials.
    type Handle: Clone + Send + Sync + 'static;

    async fn exchange_for_session(
        &self,
        request: SessionTokenRequest<'_>,
    ) -> anyhow::Result<Credentials>;

    fn bind(
        &self,
        credentials: &Credentials,
        region_name: Option<&str>,
    ) -> anyhow::Result<Self::Handle>;

    async fn assume_role(
        &self,
        handle: &Self::Handle,
        request: AssumeRoleRequest<'_>,
    ) -> anyhow::Result<Credentials>;
}

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolekeeper_schema::credentials::Credentials;
use rusoto_core::credential::StaticProvider;
use rusoto_core::{HttpClient, Region};
use rusoto_sts::{
    AssumeRoleRequest as StsAssumeRoleRequest, GetSessionTokenRequest, Sts, StsClient,
};
use tracing::debug;

use crate::identity::{AssumeRoleRequest, IdentityService, SessionTokenRequest};

fn region_from(region_name: Option<&str>) -> anyhow::Result<Region> {
    Ok(region_name
        .map(Region::from_str)
        .unwrap_or(Ok(Region::UsEast1))?)
}

fn sts_client(
    access_key_id: &str,
    secret_access_key: &str,
    session_token: Option<&str>,
    region: Region,
) -> anyhow::Result<StsClient> {
    let provider = StaticProvider::new(
        access_key_id.to_string(),
        secret_access_key.to_string(),
        session_token.map(|s| s.to_string()),
        None,
    );
    let http_client =
        HttpClient::new().map_err(|e| anyhow::anyhow!("failed to create HTTP client: {}", e))?;
    Ok(StsClient::new_with(http_client, provider, region))
}

fn credentials_from(credentials: Option<rusoto_sts::Credentials>) -> anyhow::Result<Credentials> {
    let credentials =
        credentials.ok_or_else(|| anyhow::anyhow!("STS didn't return a credential"))?;
    let expiration = DateTime::parse_from_rfc3339(&credentials.expiration)
        .map_err(|e| {
            anyhow::anyhow!(
                "invalid expiration. expiration:{}, error:{}",
                credentials.expiration,
                e
            )
        })?
        .with_timezone(&Utc);

    Ok(Credentials {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.secret_access_key,
        session_token: credentials.session_token,
        expiration,
    })
}

/// Talks to AWS STS through rusoto.
#[derive(Debug, Default, Clone)]
pub struct RusotoIdentityService;

#[async_trait]
impl IdentityService for RusotoIdentityService {
    type Handle = StsClient;

    async fn exchange_for_session(
        &self,
        request: SessionTokenRequest<'_>,
    ) -> anyhow::Result<Credentials> {
        let statics = request.static_credentials;
        let client = sts_client(
            statics.access_key_id,
            statics.secret_access_key,
            statics.session_token,
            region_from(request.region_name)?,
        )?;

        let input = GetSessionTokenRequest {
            duration_seconds: Some(request.duration_seconds),
            serial_number: request.mfa_serial.map(|s| s.to_string()),
            token_code: request.mfa_code.map(|s| s.to_string()),
            ..GetSessionTokenRequest::default()
        };

        debug!(
            "get-session-token. duration_seconds:{}, mfa:{}",
            request.duration_seconds,
            request.mfa_code.is_some()
        );
        let output = client.get_session_token(input).await?;
        credentials_from(output.credentials)
    }

    fn bind(
        &self,
        credentials: &Credentials,
        region_name: Option<&str>,
    ) -> anyhow::Result<Self::Handle> {
        sts_client(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            Some(credentials.session_token()),
            region_from(region_name)?,
        )
    }

    async fn assume_role(
        &self,
        handle: &Self::Handle,
        request: AssumeRoleRequest<'_>,
    ) -> anyhow::Result<Credentials> {
        let input = StsAssumeRoleRequest {
            role_arn: request.role_arn.to_string(),
            role_session_name: request.role_session_name.to_string(),
            external_id: request.external_id.map(|s| s.to_string()),
            duration_seconds: request.duration_seconds,
            serial_number: request.mfa_serial.map(|s| s.to_string()),
            token_code: request.mfa_code.map(|s| s.to_string()),
            ..StsAssumeRoleRequest::default()
        };

        debug!(
            "assume-role. role_arn:{}, role_session_name:{}",
            request.role_arn, request.role_session_name
        );
        let output = handle.assume_role(input).await?;
        credentials_from(output.credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sts_credentials(expiration: &str) -> rusoto_sts::Credentials {
        rusoto_sts::Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: expiration.to_string(),
        }
    }

    #[test]
    fn parses_sts_expiration_timestamps() {
        let creds = credentials_from(Some(sts_credentials("2024-05-01T12:00:00Z"))).unwrap();
        assert_eq!(creds.access_key_id(), "ASIAEXAMPLE");
        assert_eq!(
            creds.expiration(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_missing_or_malformed_credentials() {
        assert!(credentials_from(None).is_err());
        assert!(credentials_from(Some(sts_credentials("tomorrow"))).is_err());
    }

    #[test]
    fn unknown_region_is_an_error() {
        assert!(region_from(Some("us-west-2")).is_ok());
        assert!(region_from(None).is_ok());
        assert!(region_from(Some("moon-base-1")).is_err());
    }
}

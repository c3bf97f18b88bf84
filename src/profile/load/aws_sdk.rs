use std::collections::BTreeMap;
use std::convert::TryFrom;

use async_trait::async_trait;
use aws_config::profile::profile_file::ProfileFiles;
use aws_config::profile::{load, ProfileSet as SdkProfileSet};
use aws_types::os_shim_internal::{Env, Fs};
use tracing::debug;

use crate::profile::load::LoadProfiles;
use crate::profile::{Profile, ProfileSet};

fn profile_from(name: &str, value: &aws_config::profile::Profile) -> anyhow::Result<Profile> {
    fn maybe_s(s: Option<&str>) -> Option<String> {
        s.filter(|s| !s.is_empty()).map(|s| s.to_string())
    }

    fn try_n(name: &str, s: Option<&str>) -> anyhow::Result<Option<u32>> {
        s.map(|s| {
            s.parse().map(Some).map_err(|e| {
                anyhow::anyhow!("invalid duration_seconds. profile:{}, error:{}", name, e)
            })
        })
        .unwrap_or(Ok(None))
    }

    Ok(Profile {
        name: name.to_string(),
        source_profile_name: maybe_s(value.get("source_profile")),
        region_name: maybe_s(value.get("region")),
        aws_access_key_id: maybe_s(value.get("aws_access_key_id")),
        aws_secret_access_key: maybe_s(value.get("aws_secret_access_key")),
        aws_session_token: maybe_s(value.get("aws_session_token")),
        role_arn: maybe_s(value.get("role_arn")),
        role_session_name: maybe_s(value.get("role_session_name")),
        external_id: maybe_s(value.get("external_id")),
        duration_seconds: try_n(name, value.get("duration_seconds"))?,
        mfa_serial: maybe_s(value.get("mfa_serial")),
    })
}

impl TryFrom<SdkProfileSet> for ProfileSet {
    type Error = anyhow::Error;

    fn try_from(value: SdkProfileSet) -> Result<Self, Self::Error> {
        let profiles = value
            .profiles()
            .filter_map(|n| value.get_profile(n).map(|p| (n, p)))
            .map(|(n, p)| profile_from(n, p).map(|p| (n.to_string(), p)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(ProfileSet { profiles })
    }
}

/// Reads profiles from the shared AWS `config` and `credentials` files.
#[derive(Debug, Default)]
pub struct AwsSdkProfileLoader {
    profile_files: ProfileFiles,
    fs: Fs,
    env: Env,
}

impl AwsSdkProfileLoader {
    pub fn new(fs: Fs, env: Env) -> Self {
        AwsSdkProfileLoader {
            profile_files: ProfileFiles::default(),
            fs,
            env,
        }
    }
}

#[async_trait]
impl LoadProfiles for AwsSdkProfileLoader {
    async fn load_profiles(&self) -> anyhow::Result<ProfileSet> {
        let profiles = load(&self.fs, &self.env, &self.profile_files).await?;
        let profiles = ProfileSet::try_from(profiles)?;
        debug!("loaded profiles: {:?}", profiles.names().collect::<Vec<_>>());
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(config: &str, credentials: &str) -> AwsSdkProfileLoader {
        let fs = Fs::from_slice(&[
            ("/home/.aws/config", config),
            ("/home/.aws/credentials", credentials),
        ]);
        let env = Env::from_slice(&[("HOME", "/home")]);
        AwsSdkProfileLoader::new(fs, env)
    }

    #[tokio::test]
    async fn merges_config_and_credentials_files() {
        let config = "[default]\n\
                      region = us-west-2\n\
                      mfa_serial = arn:aws:iam::123456789012:mfa/alice\n\
                      \n\
                      [profile dev]\n\
                      source_profile = default\n\
                      role_arn = arn:aws:iam::123456789012:role/dev\n\
                      role_session_name = alice\n\
                      duration_seconds = 1800\n";
        let credentials = "[default]\n\
                           aws_access_key_id = AKIDEXAMPLE\n\
                           aws_secret_access_key = secret\n";

        let profiles = loader(config, credentials).load_profiles().await.unwrap();

        let default = profiles.get_profile("default").unwrap();
        assert_eq!(default.region_name(), Some("us-west-2"));
        assert_eq!(
            default.mfa_serial(),
            Some("arn:aws:iam::123456789012:mfa/alice")
        );
        assert_eq!(
            default.static_credentials().unwrap().access_key_id,
            "AKIDEXAMPLE"
        );

        let dev = profiles.get_profile("dev").unwrap();
        assert_eq!(dev.source_name(), "default");
        assert_eq!(dev.role_arn(), Some("arn:aws:iam::123456789012:role/dev"));
        assert_eq!(dev.role_session_name(), Some("alice"));
        assert_eq!(dev.duration_seconds(), Some(1800));
        assert!(dev.static_credentials().is_none());
    }

    #[tokio::test]
    async fn rejects_non_numeric_duration() {
        let config = "[profile dev]\n\
                      role_arn = arn:aws:iam::123456789012:role/dev\n\
                      duration_seconds = forever\n";

        assert!(loader(config, "").load_profiles().await.is_err());
    }
}

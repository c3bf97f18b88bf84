use std::collections::BTreeMap;

pub mod load;

/// The profile every chain ends at when no source is declared.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    pub source_profile_name: Option<String>,
    pub region_name: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub role_arn: Option<String>,
    pub role_session_name: Option<String>,
    pub external_id: Option<String>,
    pub duration_seconds: Option<u32>,
    pub mfa_serial: Option<String>,
}

impl Profile {
    pub fn has_role_arn(&self) -> bool {
        self.role_arn.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_profile_name(&self) -> Option<&str> {
        self.source_profile_name.as_deref()
    }

    /// Name of the profile whose session authenticates this one.
    ///
    /// A role without an explicit `source_profile` is backed by `default`;
    /// a profile without a role is a chain root and backs itself.
    pub fn source_name(&self) -> &str {
        match (self.source_profile_name(), self.has_role_arn()) {
            (Some(source), _) => source,
            (None, true) => DEFAULT_PROFILE,
            (None, false) => self.name(),
        }
    }

    pub fn region_name(&self) -> Option<&str> {
        self.region_name.as_deref()
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    pub fn role_session_name(&self) -> Option<&str> {
        self.role_session_name.as_deref()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn duration_seconds(&self) -> Option<u32> {
        self.duration_seconds
    }

    pub fn mfa_serial(&self) -> Option<&str> {
        self.mfa_serial.as_deref().filter(|s| !s.is_empty())
    }

    /// Long-lived key pair used to open a session, if the profile carries one.
    pub fn static_credentials(&self) -> Option<StaticCredentials<'_>> {
        match (
            self.aws_access_key_id.as_deref(),
            self.aws_secret_access_key.as_deref(),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
                session_token: self.aws_session_token.as_deref(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCredentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileSet {
    pub fn get_profile(&self, profile_name: &str) -> Option<&Profile> {
        self.profiles.get(profile_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|k| k.as_str())
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn has_default(&self) -> bool {
        self.profiles.contains_key(DEFAULT_PROFILE)
    }

    /// Checks that every role profile can reach its source profile.
    pub fn validate(&self) -> anyhow::Result<()> {
        for profile in self.profiles().filter(|p| p.has_role_arn()) {
            let source = profile.source_name();
            if source != DEFAULT_PROFILE && self.get_profile(source).is_none() {
                anyhow::bail!(
                    "source profile not found. profile:{}, source_profile:{}",
                    profile.name(),
                    source
                );
            }
        }
        Ok(())
    }
}

impl FromIterator<Profile> for ProfileSet {
    fn from_iter<T: IntoIterator<Item = Profile>>(iter: T) -> Self {
        let profiles = iter
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect::<BTreeMap<_, _>>();
        ProfileSet { profiles }
    }
}

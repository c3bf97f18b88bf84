use std::io::Write;

use rolekeeper_schema::credentials::Credentials;

pub mod export;
pub mod process;

pub struct HandleCredentialsRequest<'a> {
    pub profile_name: &'a str,
    pub region_name: Option<&'a str>,
    pub credentials: &'a Credentials,
}

pub trait HandleCredentials {
    fn handle_credentials(
        &self,
        request: HandleCredentialsRequest,
        out: &mut dyn Write,
    ) -> anyhow::Result<()>;
}

struct Variable<'a> {
    name: &'a str,
    value: Option<String>,
}

fn into_variables<'a>(request: &HandleCredentialsRequest<'a>) -> Vec<Variable<'a>> {
    fn v<S: Into<String>>(name: &str, value: Option<S>) -> Variable<'_> {
        Variable {
            name,
            value: value.map(|s| s.into()),
        }
    }

    let credentials = request.credentials;
    vec![
        // for AWS SDK, aws-cli
        v("AWS_PROFILE", Option::<String>::None),
        v("AWS_REGION", request.region_name),
        v("AWS_DEFAULT_REGION", request.region_name),
        v("AWS_ACCESS_KEY_ID", Some(credentials.access_key_id())),
        v("AWS_SECRET_ACCESS_KEY", Some(credentials.secret_access_key())),
        v("AWS_SESSION_TOKEN", Some(credentials.session_token())),
        v(
            "AWS_SESSION_EXPIRATION",
            Some(credentials.expiration().to_rfc3339()),
        ),
        // for prompts
        v("ROLEKEEPER_PROFILE", Some(request.profile_name)),
    ]
}

use std::io::Write;

use crate::handler::{into_variables, HandleCredentials, HandleCredentialsRequest, Variable};

/// Wraps `value` in single quotes so the shell takes it literally.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Prints `export`/`unset` lines for a POSIX shell to `eval`.
pub struct ExportCredentialsHandler;

impl HandleCredentials for ExportCredentialsHandler {
    fn handle_credentials(
        &self,
        request: HandleCredentialsRequest,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        for Variable { name, value } in into_variables(&request) {
            match value {
                Some(value) => writeln!(out, "export {}={}", name, shell_quote(&value))?,
                None => writeln!(out, "unset {}", name)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rolekeeper_schema::credentials::Credentials;

    #[test]
    fn exports_credentials_and_clears_profile() {
        let credentials = Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let request = HandleCredentialsRequest {
            profile_name: "dev",
            region_name: None,
            credentials: &credentials,
        };

        let mut out = Vec::new();
        ExportCredentialsHandler
            .handle_credentials(request, &mut out)
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("unset AWS_PROFILE\n"));
        assert!(out.contains("unset AWS_REGION\n"));
        assert!(out.contains("export AWS_ACCESS_KEY_ID='ASIAEXAMPLE'\n"));
        assert!(out.contains("export AWS_SESSION_TOKEN='token'\n"));
        assert!(out.contains("export AWS_SESSION_EXPIRATION='2024-05-01T12:00:00+00:00'\n"));
        assert!(out.contains("export ROLEKEEPER_PROFILE='dev'\n"));
    }

    #[test]
    fn quotes_values_for_the_shell() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("$(rm -rf ~)\"`"), "'$(rm -rf ~)\"`'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

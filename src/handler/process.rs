use std::io::Write;

use rolekeeper_schema::process::ProcessCredentials;

use crate::handler::{HandleCredentials, HandleCredentialsRequest};

/// Prints the JSON document expected from a `credential_process` command.
pub struct ProcessCredentialsHandler;

impl HandleCredentials for ProcessCredentialsHandler {
    fn handle_credentials(
        &self,
        request: HandleCredentialsRequest,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let document = ProcessCredentials::from(request.credentials);
        serde_json::to_writer(&mut *out, &document)?;
        writeln!(out)?;
        Ok(())
    }
}

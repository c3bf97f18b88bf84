use std::io;
use std::io::Write;

use async_trait::async_trait;

#[async_trait]
pub trait ReadMfaToken {
    async fn read_mfa_token(&self, mfa_serial: &str) -> anyhow::Result<String>;
}

/// Prompts on stderr, since stdout carries the credentials.
pub struct StdinMfaTokenReader;

#[async_trait]
impl ReadMfaToken for StdinMfaTokenReader {
    async fn read_mfa_token(&self, mfa_serial: &str) -> anyhow::Result<String> {
        let mfa_serial = mfa_serial.to_string();
        let code = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            eprint!("Enter MFA code for {}: ", mfa_serial);
            io::stderr().flush()?;

            let mut code = String::new();
            io::stdin().read_line(&mut code)?;
            Ok(code.trim().to_string())
        })
        .await??;

        if code.is_empty() {
            anyhow::bail!("no MFA code entered.");
        }
        Ok(code)
    }
}

/// Hands out one code given up front; later requests fail.
pub struct StaticMfaTokenReader {
    token: std::sync::Mutex<Option<String>>,
}

impl<S: Into<String>> From<S> for StaticMfaTokenReader {
    fn from(s: S) -> Self {
        StaticMfaTokenReader {
            token: std::sync::Mutex::new(Some(s.into())),
        }
    }
}

#[async_trait]
impl ReadMfaToken for StaticMfaTokenReader {
    async fn read_mfa_token(&self, mfa_serial: &str) -> anyhow::Result<String> {
        let token = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("MFA token reader poisoned."))?
            .take();
        token.ok_or_else(|| {
            anyhow::anyhow!("MFA code was already used. mfa_serial:{}", mfa_serial)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_reader_gives_out_its_code_once() {
        let reader = StaticMfaTokenReader::from("123456");
        let serial = "arn:aws:iam::123456789012:mfa/alice";

        assert_eq!(reader.read_mfa_token(serial).await.unwrap(), "123456");
        assert!(reader.read_mfa_token(serial).await.is_err());
    }
}

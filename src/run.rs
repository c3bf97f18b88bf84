use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use rolekeeper_schema::credentials::Credentials;
use tracing::{debug, error, info};

use crate::config::ManagerConfig;
use crate::error::ManagerResult;
use crate::handler::{HandleCredentials, HandleCredentialsRequest};
use crate::identity::IdentityService;
use crate::manager::CredentialsManager;
use crate::mfa::ReadMfaToken;
use crate::profile::load::LoadProfiles;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Profile authenticated first; it backs every role chain.
    pub source_profile: String,
    /// Role profile to assume once the source session is up.
    pub profile: Option<String>,
    /// Keep refreshing and re-emit renewed credentials until shutdown.
    pub watch: bool,
}

pub struct RoleKeeper<L, R, I, H> {
    loader: L,
    mfa_reader: R,
    identity: I,
    handler: H,
    config: ManagerConfig,
}

impl<L, R, I, H> RoleKeeper<L, R, I, H>
where
    L: LoadProfiles + Send + Sync + 'static,
    R: ReadMfaToken + Send + Sync + 'static,
    I: IdentityService + 'static,
    H: HandleCredentials,
{
    pub fn new(loader: L, mfa_reader: R, identity: I, handler: H, config: ManagerConfig) -> Self {
        Self {
            loader,
            mfa_reader,
            identity,
            handler,
            config,
        }
    }

    pub async fn run<W, S>(self, options: RunOptions, out: &mut W, shutdown: S) -> anyhow::Result<()>
    where
        W: Write,
        S: Future<Output = ()>,
    {
        self.config.validate()?;
        let profiles = self.loader.load_profiles().await?;
        profiles.validate()?;

        let manager = Arc::new(CredentialsManager::new(
            profiles,
            self.identity,
            self.config,
        ));

        let source = options.source_profile.clone();
        with_mfa(&self.mfa_reader, |code| {
            let manager = Arc::clone(&manager);
            let source = source.clone();
            async move { manager.set_source_profile(&source, code.as_deref()).await }
        })
        .await?;

        if let Some(profile) = options.profile.as_ref().filter(|p| **p != source) {
            debug!("target profile:{}", profile);
            with_mfa(&self.mfa_reader, |code| {
                let manager = Arc::clone(&manager);
                let profile = profile.clone();
                async move { manager.assume_role(&profile, code.as_deref()).await }
            })
            .await?;
        }

        let mut emitted = emit(&manager, &self.handler, out).await?;
        if !options.watch {
            return Ok(());
        }

        let refresher = manager.spawn_refresher()?;
        let interval = manager.config().refresh_interval;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {
                    match manager.get_credentials().await {
                        Ok(current) if current != emitted => {
                            emitted = emit(&manager, &self.handler, out).await?;
                        }
                        Ok(_) => {}
                        Err(e) => debug!("credentials unavailable. error:{}", e),
                    }
                }
            }
        }

        info!("shutting down.");
        refresher.shutdown().await;
        Ok(())
    }
}

/// Runs `op` without a code and, if an MFA device asks for one, once more
/// with a code from `reader`.
async fn with_mfa<T, R, F, Fut>(reader: &R, mut op: F) -> anyhow::Result<T>
where
    R: ReadMfaToken,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = ManagerResult<T>>,
{
    let e = match op(None).await {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    let result = match e.mfa_needed() {
        Some(mfa_serial) => {
            let code = reader.read_mfa_token(mfa_serial).await?;
            op(Some(code)).await
        }
        None => Err(e),
    };

    result.map_err(|e| {
        if e.is_fatal() {
            error!("giving up on a fatal error. error:{}", e);
        }
        e.into()
    })
}

async fn emit<I, H, W>(
    manager: &CredentialsManager<I>,
    handler: &H,
    out: &mut W,
) -> anyhow::Result<Credentials>
where
    I: IdentityService,
    H: HandleCredentials,
    W: Write,
{
    let credentials = manager.get_credentials().await?;
    let role = manager.role().await;
    let source = manager.source_profile_name().await;

    let profiles = manager.profiles();
    let region_name = profiles
        .get_profile(&role)
        .and_then(|p| p.region_name())
        .or_else(|| {
            source
                .as_deref()
                .and_then(|s| profiles.get_profile(s))
                .and_then(|p| p.region_name())
        });

    info!(
        "emitting credentials. role:{}, expiration:{}",
        role,
        credentials.expiration()
    );
    handler.handle_credentials(
        HandleCredentialsRequest {
            profile_name: &role,
            region_name,
            credentials: &credentials,
        },
        out,
    )?;
    out.flush()?;
    Ok(credentials)
}

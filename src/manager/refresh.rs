use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::identity::IdentityService;
use crate::manager::CredentialsManager;
use crate::profile::DEFAULT_PROFILE;

/// What a single refresh tick did.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The manager holds a latched error or no credentials yet.
    Unhealthy,
    /// The active credentials are not close to expiring.
    Fresh,
    /// The active role is a base profile, which is left to expire.
    BaseRole,
    Refreshed,
    Failed(ManagerError),
}

/// Handle of the background refresh task. Dropping it stops the task.
pub struct Refresher {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Refresher {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("refresher task ended abnormally. error:{}", e);
        }
    }
}

impl<I: IdentityService> CredentialsManager<I> {
    /// Re-assumes the active role when its credentials are about to expire.
    ///
    /// Base profiles are skipped: renewing them may need an MFA code that
    /// nobody is around to type.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let role = {
            let state = self.state.lock().await;
            let credentials = match (&state.last_error, &state.credentials) {
                (None, Some(credentials)) => credentials,
                _ => return RefreshOutcome::Unhealthy,
            };

            if !credentials.expires_within(Utc::now(), self.config.refresh_threshold()) {
                return RefreshOutcome::Fresh;
            }

            let is_source = state
                .source
                .as_ref()
                .map(|s| s.name() == state.role)
                .unwrap_or(false);
            if state.role.is_empty() || state.role == DEFAULT_PROFILE || is_source {
                debug!("not refreshing base profile. role:{}", state.role);
                return RefreshOutcome::BaseRole;
            }

            state.role.clone()
        };

        info!("refreshing credentials. role:{}", role);
        let outcome = match self.assume_role(&role, None).await {
            Ok(_) => RefreshOutcome::Refreshed,
            Err(e) => {
                warn!("failed to refresh credentials. role:{}, error:{}", role, e);
                RefreshOutcome::Failed(e)
            }
        };

        let mut state = self.state.lock().await;
        state.last_refresh_error = match &outcome {
            RefreshOutcome::Failed(e) => Some(e.clone()),
            _ => None,
        };
        outcome
    }
}

impl<I: IdentityService + 'static> CredentialsManager<I> {
    /// Starts the background task that calls [`refresh_once`](Self::refresh_once)
    /// every `refresh_interval`.
    pub fn spawn_refresher(self: &Arc<Self>) -> ManagerResult<Refresher> {
        self.config.validate()?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = manager.refresh_once().await;
                        debug!("refresh tick. outcome:{:?}", outcome);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("refresher stopped.");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Refresher { shutdown, task })
    }
}

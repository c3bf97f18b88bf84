pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod manager;
pub mod mfa;
pub mod profile;
pub mod run;

pub use config::ManagerConfig;
pub use error::{CredentialsError, ManagerError, ManagerResult};
pub use manager::{CredentialsManager, RefreshOutcome, Refresher};
pub use rolekeeper_schema::credentials::Credentials;

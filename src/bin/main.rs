use std::io;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use rolekeeper::config::ManagerConfig;
use rolekeeper::handler::export::ExportCredentialsHandler;
use rolekeeper::handler::process::ProcessCredentialsHandler;
use rolekeeper::handler::{HandleCredentials, HandleCredentialsRequest};
use rolekeeper::identity::rusoto::RusotoIdentityService;
use rolekeeper::mfa::{ReadMfaToken, StaticMfaTokenReader, StdinMfaTokenReader};
use rolekeeper::profile::load::aws_sdk::AwsSdkProfileLoader;
use rolekeeper::profile::DEFAULT_PROFILE;
use rolekeeper::run::{RoleKeeper, RunOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// JSON for the `credential_process` profile setting.
    Process,
    /// `export` lines for a POSIX shell.
    Env,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Role profile to assume.
    #[arg()]
    profile: Option<String>,

    /// Token code provided by the MFA device.
    #[arg(short, long)]
    token: Option<String>,

    /// Profile whose static credentials open the source session.
    #[arg(short, long, default_value = DEFAULT_PROFILE)]
    source: String,

    #[arg(short, long, value_enum, default_value_t = Format::Process)]
    format: Format,

    /// Keep running and print the credentials again each time they are renewed.
    #[arg(short, long)]
    watch: bool,

    /// Seconds between expiration checks.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    refresh_interval: u64,

    /// Remaining lifetime, in seconds, below which the role is re-assumed.
    #[arg(long, default_value_t = 600)]
    refresh_threshold: u64,

    /// Seconds to wait for a single STS call.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("error:{:?}", e);
            Err(e)
        }
    }
}

enum CredentialsHandler {
    Process(ProcessCredentialsHandler),
    Export(ExportCredentialsHandler),
}

impl HandleCredentials for CredentialsHandler {
    fn handle_credentials(
        &self,
        request: HandleCredentialsRequest,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        use CredentialsHandler::*;
        match self {
            Process(h) => h.handle_credentials(request, out),
            Export(h) => h.handle_credentials(request, out),
        }
    }
}

fn handler_from(args: &Args) -> CredentialsHandler {
    match args.format {
        Format::Process => CredentialsHandler::Process(ProcessCredentialsHandler),
        Format::Env => CredentialsHandler::Export(ExportCredentialsHandler),
    }
}

enum MfaReader {
    Stdin(StdinMfaTokenReader),
    Static(StaticMfaTokenReader),
}

#[async_trait]
impl ReadMfaToken for MfaReader {
    async fn read_mfa_token(&self, mfa_serial: &str) -> anyhow::Result<String> {
        use MfaReader::*;
        match self {
            Stdin(r) => r.read_mfa_token(mfa_serial).await,
            Static(r) => r.read_mfa_token(mfa_serial).await,
        }
    }
}

fn mfa_reader_from(args: &Args) -> MfaReader {
    if let Some(token) = args.token.as_ref() {
        MfaReader::Static(StaticMfaTokenReader::from(token))
    } else {
        MfaReader::Stdin(StdinMfaTokenReader)
    }
}

fn config_from(args: &Args) -> ManagerConfig {
    ManagerConfig::default()
        .with_refresh_interval(Duration::from_secs(args.refresh_interval))
        .with_refresh_threshold(Duration::from_secs(args.refresh_threshold))
        .with_call_timeout(Duration::from_secs(args.timeout))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c. error:{}", e);
        std::future::pending::<()>().await;
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let options = RunOptions {
        source_profile: args.source.clone(),
        profile: args.profile.clone(),
        watch: args.watch,
    };

    let rolekeeper = RoleKeeper::new(
        AwsSdkProfileLoader::default(),
        mfa_reader_from(&args),
        RusotoIdentityService,
        handler_from(&args),
        config_from(&args),
    );

    let mut stdout = io::stdout();
    rolekeeper.run(options, &mut stdout, shutdown_signal()).await?;
    Ok(())
}

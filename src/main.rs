//! Binary entry point for the Voluma CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use voluma::{
    Finalizer, Provider, ResizeError, ResizeOrchestrator, ResizePolicy, ResizeRequest,
    ResizeSettings, ScalewayConfig, ScalewayDnsError, ScalewayDnsUpdater, ScalewayProvider,
    ScalewayProviderError, SweepError, Sweeper, TcpHealthProbe,
};

mod cli;

use cli::{Cli, ResizeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("resize failed: {0}")]
    Resize(#[from] ResizeError<ScalewayProviderError, ScalewayDnsError>),
    #[error("sweep failed: {0}")]
    Sweep(#[from] SweepError<ScalewayProviderError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Resize(command) => resize_command(command).await,
        Cli::Sweep => sweep_command().await,
    }
}

fn build_provider() -> Result<(Arc<ScalewayProvider>, ScalewayConfig), CliError> {
    let scaleway_config = ScalewayConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let provider = ScalewayProvider::new(scaleway_config.clone())
        .map_err(|err| CliError::Provider(err.to_string()))?;
    Ok((Arc::new(provider), scaleway_config))
}

async fn resize_command(args: ResizeCommand) -> Result<i32, CliError> {
    let settings =
        ResizeSettings::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    settings
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let (provider, scaleway_config) = build_provider()?;

    // The workflow treats the recorded state as best-effort input; seed it
    // from the provider's current view.
    let instance = provider
        .instance(&args.machine_id)
        .await
        .map_err(|err| CliError::Provider(err.to_string()))?;

    let request = ResizeRequest::builder()
        .machine_id(&args.machine_id)
        .desired_size_gb(args.size_gb)
        .current_state(instance.state)
        .domain_name(&args.domain)
        .username(&args.user)
        .build()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let finalizer = Finalizer::new(
        ScalewayDnsUpdater::new(scaleway_config.secret_key.clone()),
        TcpHealthProbe,
    )
    .with_probe_timeout(settings.probe_timeout())
    .with_probe_port(settings.probe_port);

    let orchestrator = ResizeOrchestrator::new(
        provider,
        finalizer,
        ResizePolicy::new(settings.max_size_gb, settings.volume_type.clone()),
    )
    .with_poller(settings.poller());

    let artifact = orchestrator.execute(&request).await?;

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "machine {} resized to {}GB",
        artifact.instance_id, request.desired_size_gb
    )
    .ok();
    writeln!(stdout, "ip: {}", artifact.ip).ok();
    writeln!(stdout, "domain: {}", artifact.domain_name).ok();
    Ok(0)
}

async fn sweep_command() -> Result<i32, CliError> {
    let (provider, _scaleway_config) = build_provider()?;
    let summary = Sweeper::new(provider).sweep().await?;
    writeln!(
        io::stdout(),
        "deleted {} volumes and {} snapshots",
        summary.deleted_volumes,
        summary.deleted_snapshots
    )
    .ok();
    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

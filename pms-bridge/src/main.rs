mod config;

use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use gateway::orchestrator::Gateway;
use metrics_exporter_statsd::StatsdBuilder;
use outbound::Sender;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use translator::mapping_store::FilesystemMappingProvider;
use translator::{MappingStore, PluginRegistry};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(about = "PMS to RGBridge integration gateway")]
enum CliCommand {
    /// Serve the inbound API and the admin listener.
    Run(CommonArgs),
    /// Print the identifiers of every registered plugin.
    ListPlugins(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long)]
    config_file_path: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not build outbound client: {0}")]
    Outbound(#[from] outbound::DeliveryError),
    #[error(transparent)]
    Serve(#[from] gateway::ServeError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Run(args) => run(args),
        CliCommand::ListPlugins(args) => list_plugins(args),
    };

    if let Err(e) = result {
        // Logging may not be up yet.
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: CommonArgs) -> Result<(), CliError> {
    let config = Config::load(args.config_file_path.as_deref())?;
    let _sentry = init_logging(config.logging.as_ref());
    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let registry = build_registry(&config);
        let sender = Sender::new(&config.outbound)?;
        let gateway = Gateway::new(registry, Arc::new(sender));

        tracing::info!(
            listener = %format!("{}:{}", config.listener.host, config.listener.port),
            outbound = %config.outbound.url,
            "Starting pms-bridge"
        );
        gateway::run(config.serve_config(), gateway).await?;
        Ok::<(), CliError>(())
    })
}

fn list_plugins(args: CommonArgs) -> Result<(), CliError> {
    let config = Config::load(args.config_file_path.as_deref())?;
    let registry = build_registry(&config);
    for identifier in registry.list_available() {
        println!("{identifier}");
    }
    Ok(())
}

fn build_registry(config: &Config) -> PluginRegistry {
    let provider = FilesystemMappingProvider::new(&config.mappings.base_dir);
    let mappings = MappingStore::new(Arc::new(provider));
    PluginRegistry::from_config(&config.plugins, mappings)
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(guard.is_some().then(sentry::integrations::tracing::layer))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some("pms_bridge"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    for defs in [
        translator::metrics_defs::ALL_METRICS,
        outbound::metrics_defs::ALL_METRICS,
        gateway::metrics_defs::ALL_METRICS,
    ] {
        shared::metrics_defs::describe_all(defs);
    }
    tracing::info!(host = %config.statsd_host, port = config.statsd_port, "StatsD metrics enabled");
    Ok(())
}

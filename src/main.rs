use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use nodewatch::aggregator::{HostIdentity, OutputAggregator};
use nodewatch::collectors;
use nodewatch::config::{Config, ConfigStore};
use nodewatch::connection::Connection;
use nodewatch::error::ConfigurationError;
use nodewatch::exporter::{run_exporter, FileExporter};
use nodewatch::pipeline::AcquisitionPipeline;
use nodewatch::registry::ModuleRegistry;
use nodewatch::scheduler::{Scheduler, SchedulerSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Command-line arguments for the monitoring agent
#[derive(Parser)]
#[command(
    name = "nodewatch",
    about = "Node monitoring agent - periodically collects system data into one JSON document",
    long_about = "A monitoring daemon that runs a set of data-acquisition modules, each on its own \
                  refresh interval, and publishes their combined results as a single JSON \
                  document for an upstream collector."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

/// Load configuration from file or use defaults
///
/// A missing file falls back to the defaults with a warning. A path that is
/// not a regular file, or a file that cannot be read, parsed or validated, is
/// an error.
fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigurationError> {
    let Some(path) = config_path else {
        info!("Using default configuration");
        return Ok(Config::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file '{}' not found, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    if !path.is_file() {
        return Err(ConfigurationError::ReadError(format!(
            "{} is not a file",
            path.display()
        )));
    }
    if path.extension().is_some_and(|extension| extension != "toml") {
        warn!(
            "Configuration file does not have .toml extension: {}",
            path.display()
        );
    }

    info!("Loading configuration from: {}", path.display());
    Config::from_file(path)
}

/// Assemble the agent and run it until a termination signal arrives
async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let connection = Connection::detached();

    let mut registry = ModuleRegistry::new();
    collectors::register_builtin(&mut registry).context("Failed to register modules")?;
    registry
        .init_all(&connection, &*config)
        .context("Failed to initialize modules")?;

    let identity = HostIdentity::detect(&*config);
    info!("Reporting as host '{}'", identity.hostname);
    let aggregator = Arc::new(OutputAggregator::new(identity));
    let (pipeline, reports) = AcquisitionPipeline::new(Arc::clone(&aggregator));

    let store: Arc<dyn ConfigStore> = config.clone();
    let scheduler = Scheduler::new(
        &registry,
        pipeline,
        reports,
        connection,
        store,
        SchedulerSettings::from(&config.agent),
    )
    .context("Failed to schedule modules")?;

    let exporter = FileExporter::from_config(&config.output);
    exporter.prepare().with_context(|| {
        format!(
            "Failed to prepare output directory for {}",
            exporter.path().display()
        )
    })?;

    let (shutdown_sender, shutdown) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down gracefully...");
        if shutdown_sender.send(true).is_err() {
            error!("Failed to send shutdown signal: agent already stopped");
        }
    })
    .context("Failed to install signal handler")?;

    let export_task = tokio::spawn(run_exporter(
        Arc::new(exporter),
        aggregator.subscribe(),
        shutdown.clone(),
    ));

    info!(
        "nodewatch is running with {} modules. Press Ctrl+C to stop.",
        registry.len()
    );
    scheduler.run(shutdown).await;

    export_task.await.context("Export task failed")?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting nodewatch {}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Everything the agent writes is private to its user
    unsafe {
        libc::umask(0o077);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("nodewatch shutdown complete");
}

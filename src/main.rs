//! hearthd — multi-agent home-automation orchestration daemon.
//!
//! Boot order: configuration → runtime wiring → agents file → device-bus
//! session (auth failure is fatal) → agent loops + orchestrator loop →
//! wait for ctrl-c → cooperative shutdown.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use hearthd::{
    config::{load_config, AppConfig},
    error::Error,
    runtime::Runtime,
};

#[derive(Parser, Debug)]
#[command(
    name = "hearthd",
    about = "Multi-agent orchestration daemon for a Home-Assistant-style device bus",
    version
)]
struct Cli {
    /// Path to hearthd.toml (default: ~/.hearthd/hearthd.toml).
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Force dry-run mode: tools simulate instead of touching the bus.
    #[arg(long)]
    dry_run: bool,

    /// Force live mode (overrides dry_run from the config file).
    #[arg(long, conflicts_with = "dry_run")]
    live: bool,

    /// Override the data directory.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Route `log` macros into the tracing subscriber.
    let _ = tracing_log::LogTracer::init();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_cli_config(&cli)?;

    let runtime = Runtime::build(config)?;
    runtime.tools.set_dry_run(
        if cli.live {
            false
        } else {
            cli.dry_run || runtime.config.safety.dry_run
        },
    );

    let agent_count = runtime.load_agents()?;
    log::info!(
        "loaded {agent_count} agents (dry_run: {})",
        runtime.tools.dry_run()
    );

    // Auth failure is fatal and surfaces here; transient connect errors are
    // fatal too at boot — the operator should fix the bus URL first.
    runtime.connect_bus().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let started = runtime.spawn_agent_loops(shutdown_rx.clone());
    log::info!("started {started} agent decision loops");

    let orchestrator = runtime.orchestrator();
    tokio::spawn(orchestrator.run_loop(shutdown_rx));

    runtime.events.system_ready();
    log::info!("hearthd ready");

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");

    let _ = shutdown_tx.send(true);
    runtime.shutdown().await;

    Ok(())
}

fn load_cli_config(cli: &Cli) -> Result<AppConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => hearthd::config::load_default_config(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.paths.data_dir = Some(data_dir.display().to_string());
    }
    Ok(config)
}

//! Warden daemon — entry point for running the admission gate.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use warden_node::{init_logging, LogFormat, NodeConfig, WardenNode};
use warden_platform::NullPlatform;
use warden_store_lmdb::LmdbStore;

#[derive(Parser)]
#[command(name = "warden-daemon", about = "Community admission gate daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identifier of the monitored group.
    #[arg(long, env = "WARDEN_GROUP_ID")]
    group: Option<String>,

    /// Data directory for the LMDB store.
    #[arg(long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "WARDEN_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable the Prometheus metrics registry.
    #[arg(long, env = "WARDEN_ENABLE_METRICS")]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the gate.
    Run,
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(&path.display().to_string())
            .with_context(|| format!("loading config {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(group) = cli.group {
        config.group_id = group;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if cli.metrics {
        config.enable_metrics = true;
    }

    if let Command::CheckConfig = cli.command {
        config.validate().context("invalid configuration")?;
        println!("configuration ok");
        return Ok(());
    }

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level);

    config.validate().context("invalid configuration")?;

    let store =
        Arc::new(LmdbStore::open(&config.data_dir).context("opening LMDB store")?);
    // The platform binding is supplied by the embedding deployment; the
    // null adapter keeps the daemon runnable standalone.
    let platform = Arc::new(NullPlatform::new());

    tracing::info!(
        group = %config.group_id,
        data_dir = %config.data_dir.display(),
        "starting warden"
    );

    let node = WardenNode::new(platform, store, config)?;
    node.start();
    node.shutdown_controller().wait_for_signal().await;
    node.stop().await;

    tracing::info!("warden daemon exited cleanly");
    Ok(())
}

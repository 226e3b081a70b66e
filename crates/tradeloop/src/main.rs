use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tradeloop::agents::claude_cli::check_cli_available;
use tradeloop::compaction::compaction_loop;
use tradeloop::models::TradeloopConfig;

#[derive(Parser, Debug)]
#[command(name = "tradeloop", about = "Autonomous agent trading loop daemon")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tradeloop.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: TradeloopConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    if !check_cli_available(&config.provider.cli_path).await {
        tracing::warn!(cli = %config.provider.cli_path, "Claude CLI not available, cycles will fail");
    }

    let runtime = tradeloop::build_runtime(config).context("Failed to build runtime")?;
    let autostart = runtime.register_agents().await?;

    let cancel = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(tradeloop::log_events(
        runtime.gateway.events().subscribe(),
        cancel.clone(),
    ));
    if let (Some(sqlite), Some(retention_days)) = (runtime.sqlite.clone(), runtime.retention_days())
    {
        let interval = Duration::from_secs(runtime.config.store.compaction_interval_seconds.max(1));
        tasks.spawn(compaction_loop(sqlite, retention_days, interval, cancel.clone()));
    }

    for agent_id in &autostart {
        match runtime.scheduler.start(agent_id).await {
            Ok(status) => tracing::info!(agent_id = %agent_id, %status, "Agent started"),
            Err(e) => tracing::error!(agent_id = %agent_id, error = %e, "Failed to start agent"),
        }
    }
    tracing::info!(
        agents = runtime.config.agents.len(),
        started = autostart.len(),
        "tradeloop running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    let report = runtime.scheduler.shutdown().await;
    for (agent_id, e) in &report.failed {
        tracing::warn!(agent_id = %agent_id, error = %e, "Agent did not stop cleanly");
    }
    cancel.cancel();
    while tasks.join_next().await.is_some() {}

    tracing::info!(stopped = report.succeeded.len(), "tradeloop stopped");
    Ok(())
}

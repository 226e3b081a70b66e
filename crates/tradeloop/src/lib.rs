//! tradeloop - autonomous agent trading loop
//!
//! Runs a fleet of trading agents on independent decision timers. Every cycle
//! gathers market, portfolio and memory snapshots, asks a decision provider
//! for a structured decision, validates it against the agent's limits and
//! executes approved trades through a permission-checked tool gateway.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradeloop::models::{Agent, TradeloopConfig};
//! use tradeloop::agents::{AgentScheduler, DecisionProvider};
//! use tradeloop::gateway::{ToolGateway, ToolImplementation};
//! use tradeloop::store::{Persistence, SqliteStore, TieredStore};
//! ```

pub use tradeloop_agents as agents;
pub use tradeloop_gateway as gateway;
pub use tradeloop_models as models;
pub use tradeloop_store as store;

pub mod compaction;
pub mod market;
pub mod paper;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tradeloop_agents::{
    AgentScheduler, ClaudeCliConfig, ClaudeDecisionProvider, DecisionProvider, Providers,
};
use tradeloop_gateway::{EventBus, ToolGateway, ToolRegistry};
use tradeloop_models::{Agent, CoreEvent, TradeloopConfig};
use tradeloop_store::{
    MemoryStore, Persistence, QuoteReader, QuoteTable, SqliteStore, TieredStore,
};

use crate::market::QuoteMarketProvider;
use crate::paper::{register_paper_tools, PaperBroker};

const EVENT_BUS_CAPACITY: usize = 1_024;
const QUOTE_CACHE_CAPACITY: u64 = 10_000;

/// Everything the daemon runs, wired from one configuration.
pub struct Runtime {
    pub config: TradeloopConfig,
    pub scheduler: AgentScheduler,
    pub gateway: Arc<ToolGateway>,
    pub broker: Arc<PaperBroker>,
    /// Primary store, when one is configured. Compaction runs against it.
    pub sqlite: Option<Arc<SqliteStore>>,
}

impl Runtime {
    /// Register every configured agent. Returns the ids marked for autostart.
    pub async fn register_agents(&self) -> anyhow::Result<Vec<String>> {
        let mut autostart = Vec::new();
        for spec in &self.config.agents {
            let agent = Agent::new(spec.id.clone(), spec.name.clone(), spec.config.clone());
            self.scheduler
                .register_agent(agent)
                .await
                .with_context(|| format!("Failed to register agent {}", spec.id))?;
            if spec.autostart {
                autostart.push(spec.id.clone());
            }
        }
        Ok(autostart)
    }

    /// Longest call-record retention any configured agent asks for.
    pub fn retention_days(&self) -> Option<u32> {
        self.config
            .agents
            .iter()
            .map(|spec| spec.config.permissions.audit.retention_days)
            .max()
    }
}

/// Build the runtime with the Claude CLI as the decision provider.
pub fn build_runtime(config: TradeloopConfig) -> anyhow::Result<Runtime> {
    let cli_config = ClaudeCliConfig::from_provider(
        &config.provider,
        Duration::from_millis(config.scheduler.decision_timeout_ms),
    );
    build_runtime_with(config, Arc::new(ClaudeDecisionProvider::new(cli_config)))
}

/// Build the runtime around an explicit decision provider.
pub fn build_runtime_with(
    config: TradeloopConfig,
    decisions: Arc<dyn DecisionProvider>,
) -> anyhow::Result<Runtime> {
    let fallback = Arc::new(MemoryStore::new(
        config.store.fallback_max_capacity,
        Duration::from_secs(config.store.fallback_ttl_seconds),
    ));

    let (sqlite, quotes) = match &config.store.sqlite_path {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create store directory: {}", parent.display())
                    })?;
                }
            }
            let sqlite = SqliteStore::open(path)
                .with_context(|| format!("Failed to open store DB: {path}"))?;
            let quotes = QuoteTable::open_writable(path)
                .with_context(|| format!("Failed to open quotes table: {path}"))?;
            (Some(Arc::new(sqlite)), quotes)
        }
        None => {
            tracing::warn!("No sqlite_path configured, persisting to memory only");
            let quotes = QuoteTable::open_in_memory().context("Failed to open quotes table")?;
            (None, quotes)
        }
    };

    let store: Arc<dyn Persistence> = Arc::new(TieredStore::new(
        sqlite.clone().map(|s| s as Arc<dyn Persistence>),
        fallback,
    ));
    let quotes = Arc::new(QuoteReader::new(
        quotes,
        QUOTE_CACHE_CAPACITY,
        Duration::from_secs(config.store.quote_cache_ttl_seconds),
    ));

    let gateway = Arc::new(ToolGateway::new(
        config.gateway.clone(),
        Arc::new(ToolRegistry::new()),
        EventBus::new(EVENT_BUS_CAPACITY),
        store.clone(),
    ));
    let broker = Arc::new(PaperBroker::new(&config.paper).with_quotes(quotes.clone()));
    register_paper_tools(&gateway, broker.clone()).context("Failed to register paper tools")?;

    let providers = Providers::new(
        decisions,
        Arc::new(QuoteMarketProvider::new(quotes)),
        broker.clone(),
    );
    let scheduler =
        AgentScheduler::new(config.scheduler.clone(), gateway.clone(), providers, store);

    Ok(Runtime {
        config,
        scheduler,
        gateway,
        broker,
        sqlite,
    })
}

/// Log every core event until cancelled.
pub async fn log_events(mut events: broadcast::Receiver<CoreEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(agent_id = event.agent_id(), event = %json, "Core event"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

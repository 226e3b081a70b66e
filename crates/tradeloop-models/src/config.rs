use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent::AgentSpec;

/// Top-level configuration for the tradeloop daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TradeloopConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

/// Decision loop timing, failure ceiling and snapshot/provider timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval used when an agent does not set one.
    pub default_decision_interval_ms: u64,
    /// Lower bound applied to every agent's interval.
    pub min_decision_interval_ms: u64,
    /// Failed cycles tolerated before the agent is forced into `Error`.
    pub max_cycle_errors: u64,
    pub snapshot_timeout_ms: u64,
    pub decision_timeout_ms: u64,
    /// Cycle records kept in memory per agent.
    pub cycle_history_limit: usize,
    /// Gateway tool used to execute approved trades.
    pub execution_tool: String,
    /// Value for the execution tool's `strategy` parameter.
    pub order_strategy: String,
    /// Decisions below this confidence are rejected. None = no floor.
    pub min_confidence: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_decision_interval_ms: 30_000,
            min_decision_interval_ms: 1_000,
            max_cycle_errors: 10,
            snapshot_timeout_ms: 5_000,
            decision_timeout_ms: 60_000,
            cycle_history_limit: 100,
            execution_tool: "execute_smart_order".to_string(),
            order_strategy: "market".to_string(),
            min_confidence: None,
        }
    }
}

impl SchedulerConfig {
    /// Effective interval for an agent: its own setting or the default, never below the minimum.
    pub fn effective_interval_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_decision_interval_ms)
            .max(self.min_decision_interval_ms)
            .max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound on a single tool dispatch.
    pub dispatch_timeout_ms: u64,
    /// Call records kept in the in-memory ledger.
    pub audit_capacity: usize,
    /// Closed sessions kept per agent for inspection.
    pub session_history_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 30_000,
            audit_capacity: 10_000,
            session_history_limit: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file for the primary store. None = in-memory fallback only.
    pub sqlite_path: Option<String>,
    /// Entries kept by the in-memory fallback tier.
    pub fallback_max_capacity: u64,
    pub fallback_ttl_seconds: u64,
    /// Interval between call-record retention passes.
    pub compaction_interval_seconds: u64,
    /// How long a quote read from SQLite stays in the hot cache.
    pub quote_cache_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some("data/tradeloop.db".to_string()),
            fallback_max_capacity: 10_000,
            fallback_ttl_seconds: 86_400,
            compaction_interval_seconds: 3_600,
            quote_cache_ttl_seconds: 5,
        }
    }
}

/// Decision provider settings (Claude CLI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub cli_path: String,
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            cli_path: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

/// Paper broker settings used by the bundled trading tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaperConfig {
    pub starting_cash: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_cash: Decimal::from(100_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Capability;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_interval_bounds() {
        let config = SchedulerConfig::default();
        assert_eq!(config.effective_interval_ms(None), 30_000);
        assert_eq!(config.effective_interval_ms(Some(200)), 1_000);
        assert_eq!(config.effective_interval_ms(Some(5_000)), 5_000);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: TradeloopConfig = toml::from_str("").unwrap();
        assert_eq!(config, TradeloopConfig::default());
        assert_eq!(config.scheduler.max_cycle_errors, 10);
        assert_eq!(config.gateway.audit_capacity, 10_000);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[scheduler]
default_decision_interval_ms = 10000
max_cycle_errors = 3

[gateway]
dispatch_timeout_ms = 5000

[store]
sqlite_path = "/tmp/tradeloop_test.db"

[paper]
starting_cash = "2500.00"

[[agents]]
id = "trend-1"
name = "Trend Follower"

[agents.config]
decision_interval_ms = 15000
max_risk_per_trade = "0.05"
allowed_symbols = ["AAPL", "MSFT"]

[agents.config.strategy]
name = "trend_following"
parameters = { lookback = 20 }

[agents.config.permissions]
capabilities = ["trading", "portfolio"]
blocked_tools = ["stress_test_portfolio"]

[agents.config.permissions.quota]
max_calls_per_minute = 10
max_calls_per_day = 500

[[agents]]
id = "mean-rev-1"
name = "Mean Reversion"
autostart = false

[agents.config]
max_risk_per_trade = "0.02"
"#;

        let config: TradeloopConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.default_decision_interval_ms, 10_000);
        assert_eq!(config.scheduler.max_cycle_errors, 3);
        assert_eq!(config.scheduler.snapshot_timeout_ms, 5_000);
        assert_eq!(config.gateway.dispatch_timeout_ms, 5_000);
        assert_eq!(config.paper.starting_cash, dec!(2500.00));
        assert_eq!(config.agents.len(), 2);

        let trend = &config.agents[0];
        assert!(trend.autostart);
        assert_eq!(trend.config.decision_interval_ms, Some(15_000));
        assert_eq!(trend.config.strategy.parameters["lookback"], 20);
        assert_eq!(
            trend.config.permissions.capabilities,
            vec![Capability::Trading, Capability::Portfolio]
        );
        assert_eq!(trend.config.permissions.quota.max_calls_per_minute, 10);

        let mean_rev = &config.agents[1];
        assert!(!mean_rev.autostart);
        assert!(mean_rev.config.allowed_symbols.is_empty());
        assert_eq!(mean_rev.config.max_risk_per_trade, dec!(0.02));
    }
}

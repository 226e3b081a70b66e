use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::permission::PermissionProfile;

/// Lifecycle status of an agent. New agents start `Stopped`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    #[default]
    Stopped,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy name plus free-form parameters handed to the decision provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StrategyParams {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Decision interval in milliseconds. None = scheduler default.
    #[serde(default)]
    pub decision_interval_ms: Option<u64>,
    /// Fraction of available cash a single trade may commit (0.05 = 5%).
    pub max_risk_per_trade: Decimal,
    /// Symbols this agent may trade. An empty list allows nothing.
    #[serde(default)]
    pub allowed_symbols: Vec<String>,
    #[serde(default)]
    pub strategy: StrategyParams,
    #[serde(default)]
    pub permissions: PermissionProfile,
}

impl AgentConfig {
    pub fn allows_symbol(&self, symbol: &str) -> bool {
        self.allowed_symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

/// Running performance counters for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Performance {
    pub total_decisions: u64,
    pub successful_decisions: u64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub pnl: Decimal,
    /// winning_trades / total_trades, 0.0 before the first trade.
    pub win_rate: f64,
    pub consecutive_failures: u32,
}

impl Performance {
    /// Failed cycles so far (`total_decisions - successful_decisions`).
    pub fn error_count(&self) -> u64 {
        self.total_decisions.saturating_sub(self.successful_decisions)
    }

    pub fn record_cycle(&mut self, success: bool) {
        self.total_decisions += 1;
        if success {
            self.successful_decisions += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    /// Record an executed trade and, when the fill reported one, its realized PnL.
    pub fn record_trade(&mut self, realized_pnl: Option<Decimal>) {
        self.total_trades += 1;
        if let Some(pnl) = realized_pnl {
            self.pnl += pnl;
            if pnl > Decimal::ZERO {
                self.winning_trades += 1;
            }
        }
        self.win_rate = self.winning_trades as f64 / self.total_trades as f64;
    }
}

/// An autonomous trading agent as owned by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub config: AgentConfig,
    pub performance: Performance,
    pub created_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: AgentStatus::Stopped,
            config,
            performance: Performance::default(),
            created_at: Utc::now(),
            last_cycle_at: None,
        }
    }
}

/// Declarative agent entry as it appears in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    /// Start the agent when the daemon boots.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
    pub config: AgentConfig,
}

fn default_autostart() -> bool {
    true
}

/// Persisted status row for an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatusRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    pub performance: Performance,
    pub updated_at: DateTime<Utc>,
}

impl From<&Agent> for AgentStatusRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            agent_id: agent.id.clone(),
            status: agent.status,
            performance: agent.performance.clone(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(AgentStatus::default(), AgentStatus::Stopped);
    }

    #[test]
    fn error_count_tracks_failed_cycles() {
        let mut perf = Performance::default();
        perf.record_cycle(true);
        perf.record_cycle(false);
        perf.record_cycle(false);
        assert_eq!(perf.total_decisions, 3);
        assert_eq!(perf.error_count(), 2);
        assert_eq!(perf.consecutive_failures, 2);

        perf.record_cycle(true);
        assert_eq!(perf.consecutive_failures, 0);
        assert_eq!(perf.error_count(), 2);
    }

    #[test]
    fn trades_update_pnl_and_win_rate() {
        let mut perf = Performance::default();
        perf.record_trade(Some(dec!(12.50)));
        perf.record_trade(Some(dec!(-2.00)));
        perf.record_trade(None);
        perf.record_trade(Some(dec!(1.00)));

        assert_eq!(perf.total_trades, 4);
        assert_eq!(perf.winning_trades, 2);
        assert_eq!(perf.pnl, dec!(11.50));
        assert!((perf.win_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn symbol_allow_list_is_case_insensitive_and_closed_when_empty() {
        let mut config = AgentConfig {
            decision_interval_ms: None,
            max_risk_per_trade: dec!(0.05),
            allowed_symbols: vec!["AAPL".to_string()],
            strategy: StrategyParams::default(),
            permissions: PermissionProfile::default(),
        };
        assert!(config.allows_symbol("aapl"));
        assert!(!config.allows_symbol("TSLA"));

        config.allowed_symbols.clear();
        assert!(!config.allows_symbol("AAPL"));
    }
}

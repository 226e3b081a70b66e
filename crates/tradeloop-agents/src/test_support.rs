//! Scripted providers for exercising the scheduler without a model or a market feed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tradeloop_models::{
    AgentConfig, Capability, Decision, DecisionRequest, MarketSnapshot, PermissionProfile,
    PortfolioSnapshot, Position, Quote, StrategyParams,
};

use crate::error::AgentError;
use crate::provider::{DecisionProvider, MarketDataProvider, PortfolioProvider};

/// Replays queued decisions (or failures), then repeats a fallback.
pub struct ScriptedDecisions {
    script: Mutex<VecDeque<Result<Decision, String>>>,
    fallback: Result<Decision, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedDecisions {
    pub fn always(decision: Decision) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(decision),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn holding() -> Self {
        Self::always(Decision::hold("nothing to do"))
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(message.to_string()),
            ..Self::holding()
        }
    }

    /// Play `decisions` in order, then hold.
    pub fn sequence(decisions: Vec<Decision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().map(Ok).collect()),
            ..Self::holding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<Decision, String> {
        let scripted = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn make_decision(&self, _request: &DecisionRequest) -> Result<Decision, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.next();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next.map(|mut decision| {
            // Replayed decisions get fresh ids.
            decision.id = uuid::Uuid::new_v4();
            decision
        })
        .map_err(AgentError::Unavailable)
    }
}

/// Fixed quotes, or a feed that is always down.
#[derive(Debug, Clone, Default)]
pub struct StaticMarket {
    quotes: BTreeMap<String, Decimal>,
    down: bool,
}

impl StaticMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.quotes.insert(symbol.to_string(), price);
        self
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarket {
    async fn market_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, AgentError> {
        if self.down {
            return Err(AgentError::Unavailable("market feed down".to_string()));
        }
        let now = Utc::now();
        let quotes = symbols
            .iter()
            .filter_map(|s| {
                self.quotes.get(s).map(|price| {
                    (
                        s.clone(),
                        Quote {
                            price: *price,
                            volume: None,
                            as_of: now,
                        },
                    )
                })
            })
            .collect();
        Ok(MarketSnapshot {
            quotes,
            captured_at: now,
            degraded: false,
        })
    }
}

/// The same portfolio for every agent.
#[derive(Debug, Clone)]
pub struct StaticPortfolio {
    cash: Decimal,
    positions: BTreeMap<String, Position>,
}

impl StaticPortfolio {
    pub fn with_cash(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
        }
    }

    pub fn with_position(mut self, symbol: &str, quantity: Decimal, avg_price: Decimal) -> Self {
        self.positions.insert(
            symbol.to_string(),
            Position {
                quantity,
                avg_price,
            },
        );
        self
    }
}

#[async_trait]
impl PortfolioProvider for StaticPortfolio {
    async fn portfolio_snapshot(&self, _agent_id: &str) -> Result<PortfolioSnapshot, AgentError> {
        Ok(PortfolioSnapshot {
            cash: self.cash,
            positions: self.positions.clone(),
            captured_at: Utc::now(),
            degraded: false,
        })
    }
}

/// Trading-capable config for `symbols` at the given interval.
pub fn trading_config(symbols: &[&str], max_risk: Decimal, interval_ms: u64) -> AgentConfig {
    AgentConfig {
        decision_interval_ms: Some(interval_ms),
        max_risk_per_trade: max_risk,
        allowed_symbols: symbols.iter().map(|s| s.to_string()).collect(),
        strategy: StrategyParams {
            name: "test".to_string(),
            parameters: serde_json::Value::Null,
        },
        permissions: PermissionProfile {
            capabilities: vec![Capability::Trading, Capability::Portfolio],
            ..Default::default()
        },
    }
}

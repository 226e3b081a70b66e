use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentConfig, StrategyParams};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    Close,
}

impl TradeAction {
    /// Buy and sell commit capital and go through the cost check.
    pub fn is_trade(&self) -> bool {
        matches!(self, TradeAction::Buy | TradeAction::Sell)
    }
}

/// Structured decision returned by a decision provider.
///
/// Fields are optional because providers are untrusted; the validator decides
/// whether a decision is complete enough to act on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub action: Option<TradeAction>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Limit price. None = use the market quote.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, alias = "reasoning")]
    pub rationale: String,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

impl Decision {
    pub fn hold(rationale: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: Some(TradeAction::Hold),
            symbol: None,
            quantity: None,
            price: None,
            confidence: None,
            rationale: rationale.into(),
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn trade(
        action: TradeAction,
        symbol: impl Into<String>,
        quantity: Decimal,
        price: Option<Decimal>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: Some(action),
            symbol: Some(symbol.into()),
            quantity: Some(quantity),
            price,
            confidence: None,
            rationale: rationale.into(),
            stop_loss: None,
            take_profit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    #[serde(default)]
    pub volume: Option<Decimal>,
    pub as_of: DateTime<Utc>,
}

/// Market state for the symbols an agent trades.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub quotes: BTreeMap<String, Quote>,
    pub captured_at: DateTime<Utc>,
    /// True when this snapshot is a cached or default stand-in.
    #[serde(default)]
    pub degraded: bool,
}

impl MarketSnapshot {
    pub fn empty_degraded() -> Self {
        Self {
            quotes: BTreeMap::new(),
            captured_at: Utc::now(),
            degraded: true,
        }
    }

    pub fn price_of(&self, symbol: &str) -> Option<Decimal> {
        self.quotes.get(symbol).map(|q| q.price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Signed quantity; negative = short.
    pub quantity: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub degraded: bool,
}

impl PortfolioSnapshot {
    /// Zero-cash stand-in: with no cash every trade fails the cost check.
    pub fn empty_degraded() -> Self {
        Self {
            cash: Decimal::ZERO,
            positions: BTreeMap::new(),
            captured_at: Utc::now(),
            degraded: true,
        }
    }

    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Context the agent carries between cycles (notes, prior outcomes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MemorySnapshot {
    pub entries: Vec<serde_json::Value>,
    #[serde(default)]
    pub degraded: bool,
}

/// Immutable input handed to a decision provider for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRequest {
    pub request_id: Uuid,
    pub cycle_id: Uuid,
    pub agent_id: String,
    pub agent_name: String,
    pub config: AgentConfig,
    pub strategy: StrategyParams,
    pub market: MarketSnapshot,
    pub portfolio: PortfolioSnapshot,
    pub memory: MemorySnapshot,
    pub requested_at: DateTime<Utc>,
}

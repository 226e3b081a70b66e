//! Paper broker: simulated fills against per-agent cash and positions.
//!
//! Orders fill immediately and in full at the limit price when one is given,
//! otherwise at the latest quote. Positions are signed (negative = short) and
//! realized PnL is booked whenever a fill reduces an existing position.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;
use tradeloop_agents::{AgentError, PortfolioProvider};
use tradeloop_gateway::{
    RegistryError, ToolContext, ToolFailure, ToolGateway, ToolImplementation, ValidatedParameters,
};
use tradeloop_models::catalog::{default_tools, EXECUTE_SMART_ORDER, GET_PORTFOLIO_POSITIONS};
use tradeloop_models::{PaperConfig, PortfolioSnapshot, Position};
use tradeloop_store::QuoteReader;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaperError {
    #[error("Insufficient cash: order costs {cost}, {available} available")]
    InsufficientCash { cost: Decimal, available: Decimal },

    #[error("No price available for {0}")]
    NoPrice(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }
}

impl FromStr for Side {
    type Err = PaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(PaperError::InvalidOrder(format!("unknown side {other}"))),
        }
    }
}

/// Result of one simulated fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    pub cash_after: Decimal,
}

#[derive(Debug, Clone)]
struct Account {
    cash: Decimal,
    positions: BTreeMap<String, Position>,
}

pub struct PaperBroker {
    starting_cash: Decimal,
    accounts: Mutex<HashMap<String, Account>>,
    quotes: Option<Arc<QuoteReader>>,
}

impl PaperBroker {
    pub fn new(config: &PaperConfig) -> Self {
        Self {
            starting_cash: config.starting_cash,
            accounts: Mutex::new(HashMap::new()),
            quotes: None,
        }
    }

    /// Price market orders from `quotes`.
    pub fn with_quotes(mut self, quotes: Arc<QuoteReader>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current portfolio of `agent_id`. Unknown agents hold the starting cash.
    pub fn snapshot(&self, agent_id: &str) -> PortfolioSnapshot {
        let accounts = self.accounts();
        let (cash, positions) = match accounts.get(agent_id) {
            Some(account) => (account.cash, account.positions.clone()),
            None => (self.starting_cash, BTreeMap::new()),
        };
        PortfolioSnapshot {
            cash,
            positions,
            captured_at: Utc::now(),
            degraded: false,
        }
    }

    /// Fill an order at `price`, or at the latest quote when `price` is None.
    pub async fn execute(
        &self,
        agent_id: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<Fill, PaperError> {
        let price = match price {
            Some(price) => price,
            None => self.quote(symbol).await?,
        };
        self.fill(agent_id, symbol, side, quantity, price)
    }

    async fn quote(&self, symbol: &str) -> Result<Decimal, PaperError> {
        let Some(quotes) = &self.quotes else {
            return Err(PaperError::NoPrice(symbol.to_string()));
        };
        match quotes.get(symbol).await {
            Ok(Some(quote)) => Ok(quote.price),
            Ok(None) => Err(PaperError::NoPrice(symbol.to_string())),
            Err(e) => Err(PaperError::NoPrice(format!("{symbol} ({e})"))),
        }
    }

    /// Fill synchronously at a known price.
    pub fn fill(
        &self,
        agent_id: &str,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Fill, PaperError> {
        if quantity <= Decimal::ZERO {
            return Err(PaperError::InvalidOrder(format!(
                "quantity {quantity} must be positive"
            )));
        }
        if price <= Decimal::ZERO {
            return Err(PaperError::InvalidOrder(format!(
                "price {price} must be positive"
            )));
        }

        let mut accounts = self.accounts();
        let account = accounts
            .entry(agent_id.to_string())
            .or_insert_with(|| Account {
                cash: self.starting_cash,
                positions: BTreeMap::new(),
            });

        let notional = quantity * price;
        if side == Side::Buy && notional > account.cash {
            return Err(PaperError::InsufficientCash {
                cost: notional,
                available: account.cash,
            });
        }

        let held = account
            .positions
            .get(symbol)
            .cloned()
            .unwrap_or(Position {
                quantity: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            });
        let (position, realized_pnl) = apply_fill(held, side.signed(quantity), price);
        if position.quantity.is_zero() {
            account.positions.remove(symbol);
        } else {
            account.positions.insert(symbol.to_string(), position);
        }

        match side {
            Side::Buy => account.cash -= notional,
            Side::Sell => account.cash += notional,
        }

        let fill = Fill {
            order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            realized_pnl,
            cash_after: account.cash,
        };
        info!(
            agent_id,
            symbol,
            side = side.as_str(),
            %quantity,
            %price,
            realized_pnl = %realized_pnl,
            "Paper order filled"
        );
        Ok(fill)
    }
}

/// New position and realized PnL after applying a signed fill.
fn apply_fill(held: Position, delta: Decimal, price: Decimal) -> (Position, Decimal) {
    let same_direction =
        held.quantity.is_zero() || held.quantity.is_sign_positive() == delta.is_sign_positive();
    if same_direction {
        let total = held.quantity.abs() + delta.abs();
        let avg_price = (held.quantity.abs() * held.avg_price + delta.abs() * price) / total;
        return (
            Position {
                quantity: held.quantity + delta,
                avg_price,
            },
            Decimal::ZERO,
        );
    }

    let closed = held.quantity.abs().min(delta.abs());
    let realized = if held.quantity.is_sign_positive() {
        (price - held.avg_price) * closed
    } else {
        (held.avg_price - price) * closed
    };
    let quantity = held.quantity + delta;
    let avg_price = if quantity.is_zero() {
        Decimal::ZERO
    } else if quantity.is_sign_positive() == held.quantity.is_sign_positive() {
        held.avg_price
    } else {
        // Flipped through flat: the remainder opens at the fill price.
        price
    };
    (
        Position {
            quantity,
            avg_price,
        },
        realized,
    )
}

#[async_trait]
impl PortfolioProvider for PaperBroker {
    async fn portfolio_snapshot(&self, agent_id: &str) -> Result<PortfolioSnapshot, AgentError> {
        Ok(self.snapshot(agent_id))
    }
}

fn decimal_param(name: &str, value: Option<&Value>) -> Result<Option<Decimal>, ToolFailure> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(|d| Some(d.normalize()))
            .map_err(|_| ToolFailure::new(format!("{name} is not a decimal: {n}"))),
        Some(other) => Err(ToolFailure::new(format!("{name} is not a number: {other}"))),
    }
}

/// `execute_smart_order` backed by the paper broker. Every strategy fills immediately.
pub struct SmartOrderTool {
    broker: Arc<PaperBroker>,
}

impl SmartOrderTool {
    pub fn new(broker: Arc<PaperBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl ToolImplementation for SmartOrderTool {
    async fn execute(
        &self,
        params: &ValidatedParameters,
        ctx: &ToolContext,
    ) -> Result<Value, ToolFailure> {
        let symbol = params
            .str("symbol")
            .ok_or_else(|| ToolFailure::new("symbol is required"))?;
        let side: Side = params
            .str("side")
            .ok_or_else(|| ToolFailure::new("side is required"))?
            .parse()
            .map_err(|e: PaperError| ToolFailure::new(e.to_string()))?;
        let quantity = decimal_param("quantity", params.get("quantity"))?
            .ok_or_else(|| ToolFailure::new("quantity is required"))?;
        let price = decimal_param("price", params.get("price"))?;
        let strategy = params.str("strategy").unwrap_or("market");

        let fill = self
            .broker
            .execute(&ctx.agent_id, symbol, side, quantity, price)
            .await
            .map_err(|e| ToolFailure::new(e.to_string()))?;

        Ok(json!({
            "order_id": fill.order_id,
            "status": "filled",
            "symbol": fill.symbol,
            "side": fill.side.as_str(),
            "quantity": fill.quantity.to_string(),
            "price": fill.price.to_string(),
            "strategy": strategy,
            "realized_pnl": fill.realized_pnl.to_string(),
            "cash": fill.cash_after.to_string(),
        }))
    }
}

/// `get_portfolio_positions` for the calling agent.
pub struct PositionsTool {
    broker: Arc<PaperBroker>,
}

impl PositionsTool {
    pub fn new(broker: Arc<PaperBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl ToolImplementation for PositionsTool {
    async fn execute(
        &self,
        _params: &ValidatedParameters,
        ctx: &ToolContext,
    ) -> Result<Value, ToolFailure> {
        let snapshot = self.broker.snapshot(&ctx.agent_id);
        let positions: Vec<Value> = snapshot
            .positions
            .iter()
            .map(|(symbol, p)| {
                json!({
                    "symbol": symbol,
                    "quantity": p.quantity.to_string(),
                    "avg_price": p.avg_price.to_string(),
                })
            })
            .collect();
        Ok(json!({
            "cash": snapshot.cash.to_string(),
            "positions": positions,
        }))
    }
}

/// Register the catalog definitions of the paper-backed tools with `gateway`.
pub fn register_paper_tools(
    gateway: &ToolGateway,
    broker: Arc<PaperBroker>,
) -> Result<(), RegistryError> {
    for definition in default_tools() {
        let implementation: Arc<dyn ToolImplementation> = match definition.id.as_str() {
            EXECUTE_SMART_ORDER => Arc::new(SmartOrderTool::new(broker.clone())),
            GET_PORTFOLIO_POSITIONS => Arc::new(PositionsTool::new(broker.clone())),
            _ => continue,
        };
        gateway.register_tool(definition, implementation)?;
    }
    Ok(())
}

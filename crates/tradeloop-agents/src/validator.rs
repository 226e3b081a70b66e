use rust_decimal::Decimal;
use tradeloop_models::{
    AgentConfig, Decision, MarketSnapshot, PortfolioSnapshot, TradeAction, ValidationOutcome,
};

/// Tunable validation thresholds. Risk limits come from the agent's own config.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValidationPolicy {
    /// Decisions below this confidence (or without one) are rejected.
    pub min_confidence: Option<f64>,
}

/// Checks a provider decision before anything is executed.
///
/// Every failing rule contributes a reason; a decision is approved only when
/// none do.
#[derive(Debug, Clone, Default)]
pub struct DecisionValidator {
    policy: ValidationPolicy,
}

impl DecisionValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn validate(
        &self,
        decision: &Decision,
        config: &AgentConfig,
        market: &MarketSnapshot,
        portfolio: &PortfolioSnapshot,
    ) -> ValidationOutcome {
        let mut reasons = Vec::new();

        if decision.action.is_none() {
            reasons.push("decision has no action".to_string());
        }
        if decision.rationale.trim().is_empty() {
            reasons.push("decision has no rationale".to_string());
        }
        if let Some(floor) = self.policy.min_confidence {
            match decision.confidence {
                Some(c) if c >= floor => {}
                Some(c) => reasons.push(format!("confidence {c} is below the {floor} floor")),
                None => reasons.push(format!("confidence missing, {floor} required")),
            }
        }

        match decision.action {
            Some(action) if action.is_trade() => {
                check_trade(decision, config, market, portfolio, &mut reasons)
            }
            Some(TradeAction::Close) => {
                check_symbol(decision, config, &mut reasons);
            }
            _ => {}
        }

        if reasons.is_empty() {
            ValidationOutcome::Approved
        } else {
            ValidationOutcome::Rejected { reasons }
        }
    }
}

fn check_symbol<'a>(
    decision: &'a Decision,
    config: &AgentConfig,
    reasons: &mut Vec<String>,
) -> Option<&'a str> {
    match decision.symbol.as_deref().map(str::trim) {
        None | Some("") => {
            reasons.push("decision has no symbol".to_string());
            None
        }
        Some(symbol) if !config.allows_symbol(symbol) => {
            reasons.push(format!("symbol {symbol} is not in the allowed set"));
            None
        }
        Some(symbol) => Some(symbol),
    }
}

fn check_trade(
    decision: &Decision,
    config: &AgentConfig,
    market: &MarketSnapshot,
    portfolio: &PortfolioSnapshot,
    reasons: &mut Vec<String>,
) {
    let symbol = check_symbol(decision, config, reasons);

    let quantity = match decision.quantity {
        Some(q) if q > Decimal::ZERO => Some(q),
        Some(q) => {
            reasons.push(format!("quantity {q} must be positive"));
            None
        }
        None => {
            reasons.push("decision has no quantity".to_string());
            None
        }
    };

    let price = decision
        .price
        .or_else(|| symbol.and_then(|s| market.price_of(s)))
        .filter(|p| *p > Decimal::ZERO);
    if price.is_none() {
        reasons.push(match symbol {
            Some(s) => format!("no price available for {s}"),
            None => "no price available".to_string(),
        });
    }

    if let (Some(quantity), Some(price)) = (quantity, price) {
        let cost = quantity * price;
        let limit = portfolio.cash * config.max_risk_per_trade;
        if cost > limit {
            reasons.push(format!(
                "cost {cost} exceeds risk limit {limit} ({} of cash {})",
                config.max_risk_per_trade, portfolio.cash
            ));
        }
    }
}

/// Price a trade would be filled at: the decision's own, else the market quote.
pub fn resolve_price(decision: &Decision, market: &MarketSnapshot) -> Option<Decimal> {
    decision
        .price
        .or_else(|| decision.symbol.as_deref().and_then(|s| market.price_of(s)))
}

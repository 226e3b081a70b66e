//! Built-in tool definitions registered by the daemon at startup.

use serde_json::json;

use crate::tool::{ParamType, ParameterSpec, ToolCategory, ToolDefinition};

pub const EXECUTE_SMART_ORDER: &str = "execute_smart_order";
pub const GET_PORTFOLIO_POSITIONS: &str = "get_portfolio_positions";

const TIMEFRAMES: [&str; 5] = ["1h", "4h", "1d", "1w", "1m"];
const PERIODS: [&str; 5] = ["1d", "1w", "1m", "3m", "1y"];

fn symbol() -> ParameterSpec {
    ParameterSpec::required("symbol", ParamType::String, "Instrument symbol")
}

pub fn default_tools() -> Vec<ToolDefinition> {
    vec![
        // Market analysis
        ToolDefinition::new(
            "get_market_sentiment",
            "Market Sentiment",
            ToolCategory::MarketAnalysis,
            "Analyze market sentiment for a specific symbol",
        )
        .with_parameter(symbol())
        .with_parameter(
            ParameterSpec::optional("timeframe", ParamType::String, "Aggregation window")
                .with_allowed(["1h", "4h", "1d"])
                .with_default(json!("1d")),
        )
        .with_parameter(ParameterSpec::optional(
            "sources",
            ParamType::Array,
            "Sentiment sources (news, social, technical)",
        )),
        ToolDefinition::new(
            "analyze_price_action",
            "Price Action Analysis",
            ToolCategory::MarketAnalysis,
            "Price action analysis with technical indicators",
        )
        .with_parameter(symbol())
        .with_parameter(
            ParameterSpec::optional("timeframe", ParamType::String, "Bar timeframe")
                .with_allowed(TIMEFRAMES)
                .with_default(json!("1d")),
        )
        .with_parameter(ParameterSpec::optional(
            "indicators",
            ParamType::Array,
            "Indicator names",
        )),
        ToolDefinition::new(
            "get_order_book_depth",
            "Order Book Depth",
            ToolCategory::MarketAnalysis,
            "Order book analysis",
        )
        .with_parameter(symbol())
        .with_parameter(
            ParameterSpec::optional("depth", ParamType::Integer, "Number of levels")
                .with_range(Some(1.0), Some(100.0))
                .with_default(json!(10)),
        ),
        // Market scanning
        ToolDefinition::new(
            "scan_arbitrage_opportunities",
            "Arbitrage Scanner",
            ToolCategory::MarketScanning,
            "Scan for arbitrage opportunities across exchanges",
        )
        .with_parameter(ParameterSpec::required(
            "symbols",
            ParamType::Array,
            "Symbols to scan",
        ))
        .with_parameter(
            ParameterSpec::optional("min_spread", ParamType::Number, "Minimum spread fraction")
                .with_range(Some(0.0), None)
                .with_default(json!(0.001)),
        )
        .with_parameter(ParameterSpec::optional(
            "exchanges",
            ParamType::Array,
            "Exchanges to compare",
        )),
        // Trade execution
        ToolDefinition::new(
            EXECUTE_SMART_ORDER,
            "Smart Order",
            ToolCategory::TradeExecution,
            "Execute orders with market, limit, TWAP, VWAP or iceberg strategies",
        )
        .with_parameter(symbol())
        .with_parameter(
            ParameterSpec::required("side", ParamType::String, "Order side")
                .with_allowed(["buy", "sell"]),
        )
        .with_parameter(
            ParameterSpec::required("quantity", ParamType::Number, "Order quantity")
                .with_range(Some(1e-8), None),
        )
        .with_parameter(
            ParameterSpec::optional("strategy", ParamType::String, "Execution strategy")
                .with_allowed(["market", "limit", "twap", "vwap", "iceberg"])
                .with_default(json!("market")),
        )
        .with_parameter(
            ParameterSpec::optional("price", ParamType::Number, "Limit price")
                .with_range(Some(0.0), None),
        )
        .with_parameter(
            ParameterSpec::optional("time_window", ParamType::Integer, "Minutes to work the order")
                .with_range(Some(1.0), Some(1440.0))
                .with_default(json!(60)),
        ),
        // Portfolio management
        ToolDefinition::new(
            GET_PORTFOLIO_POSITIONS,
            "Portfolio Positions",
            ToolCategory::PortfolioManagement,
            "Current portfolio positions and cash",
        )
        .with_parameter(
            ParameterSpec::optional("include_closed", ParamType::Boolean, "Include flat positions")
                .with_default(json!(false)),
        )
        .with_parameter(ParameterSpec::optional(
            "filter_by_symbol",
            ParamType::String,
            "Only this symbol",
        )),
        // Risk assessment
        ToolDefinition::new(
            "calculate_optimal_position_size",
            "Position Sizing",
            ToolCategory::RiskAssessment,
            "Kelly-criterion position size bounded by max risk",
        )
        .with_parameter(symbol())
        .with_parameter(
            ParameterSpec::required("win_rate", ParamType::Number, "Historical win rate")
                .with_range(Some(0.0), Some(1.0)),
        )
        .with_parameter(
            ParameterSpec::required("avg_win", ParamType::Number, "Average winning trade")
                .with_range(Some(0.0), None),
        )
        .with_parameter(
            ParameterSpec::required("avg_loss", ParamType::Number, "Average losing trade")
                .with_range(Some(0.0), None),
        )
        .with_parameter(
            ParameterSpec::optional("max_risk", ParamType::Number, "Risk ceiling fraction")
                .with_range(Some(0.0), Some(1.0))
                .with_default(json!(0.02)),
        ),
        ToolDefinition::new(
            "calculate_portfolio_var",
            "Portfolio VaR",
            ToolCategory::RiskAssessment,
            "Monte Carlo value at risk",
        )
        .with_parameter(
            ParameterSpec::optional("confidence_level", ParamType::Number, "VaR confidence")
                .with_range(Some(0.5), Some(0.999))
                .with_default(json!(0.95)),
        )
        .with_parameter(
            ParameterSpec::optional("time_horizon", ParamType::Integer, "Horizon in days")
                .with_range(Some(1.0), Some(365.0))
                .with_default(json!(1)),
        )
        .with_parameter(
            ParameterSpec::optional("simulation_runs", ParamType::Integer, "Monte Carlo paths")
                .with_range(Some(100.0), Some(1_000_000.0))
                .with_default(json!(10_000)),
        ),
        ToolDefinition::new(
            "stress_test_portfolio",
            "Stress Test",
            ToolCategory::RiskAssessment,
            "Portfolio stress test under a named scenario",
        )
        .with_parameter(
            ParameterSpec::required("scenario", ParamType::String, "Scenario")
                .with_allowed(["market_crash", "volatility_spike", "interest_rate_change"]),
        )
        .with_parameter(
            ParameterSpec::optional("severity", ParamType::Number, "Scenario severity")
                .with_range(Some(0.1), Some(1.0))
                .with_default(json!(0.5)),
        ),
        // Performance tracking
        ToolDefinition::new(
            "get_agent_performance",
            "Agent Performance",
            ToolCategory::PerformanceTracking,
            "Agent performance metrics over a period",
        )
        .with_parameter(ParameterSpec::required(
            "agent_id",
            ParamType::String,
            "Agent to report on",
        ))
        .with_parameter(
            ParameterSpec::optional("period", ParamType::String, "Reporting period")
                .with_allowed(PERIODS)
                .with_default(json!("1m")),
        )
        .with_parameter(ParameterSpec::optional(
            "metrics",
            ParamType::Array,
            "Metric names",
        )),
        ToolDefinition::new(
            "compare_strategy_performance",
            "Strategy Comparison",
            ToolCategory::PerformanceTracking,
            "Compare strategies against a benchmark",
        )
        .with_parameter(ParameterSpec::required(
            "strategies",
            ParamType::Array,
            "Strategy names",
        ))
        .with_parameter(
            ParameterSpec::optional("period", ParamType::String, "Comparison period")
                .with_allowed(PERIODS)
                .with_default(json!("3m")),
        )
        .with_parameter(ParameterSpec::optional(
            "benchmark",
            ParamType::String,
            "Benchmark symbol",
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique() {
        let tools = default_tools();
        assert_eq!(tools.len(), 11);
        let ids: HashSet<_> = tools.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), tools.len());
    }

    #[test]
    fn smart_order_schema() {
        let tools = default_tools();
        let order = tools.iter().find(|t| t.id == EXECUTE_SMART_ORDER).unwrap();
        assert_eq!(order.category, ToolCategory::TradeExecution);

        let strategy = order.parameters.iter().find(|p| p.name == "strategy").unwrap();
        assert!(!strategy.required);
        assert_eq!(strategy.default, Some(json!("market")));

        let window = order.parameters.iter().find(|p| p.name == "time_window").unwrap();
        assert_eq!(window.min, Some(1.0));
        assert_eq!(window.max, Some(1440.0));
    }

    #[test]
    fn every_category_is_covered() {
        let categories: HashSet<_> = default_tools().iter().map(|t| t.category).collect();
        assert_eq!(categories.len(), 6);
    }
}

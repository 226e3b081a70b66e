use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    MarketAnalysis,
    TradeExecution,
    PortfolioManagement,
    RiskAssessment,
    PerformanceTracking,
    MarketScanning,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::MarketAnalysis => "market_analysis",
            ToolCategory::TradeExecution => "trade_execution",
            ToolCategory::PortfolioManagement => "portfolio_management",
            ToolCategory::RiskAssessment => "risk_assessment",
            ToolCategory::PerformanceTracking => "performance_tracking",
            ToolCategory::MarketScanning => "market_scanning",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// One named parameter in a tool's schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Applied when the parameter is omitted.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Inclusive numeric lower bound.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive numeric upper bound.
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed values (enum membership).
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
            min: None,
            max: None,
            allowed: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(
            values
                .into_iter()
                .map(|v| serde_json::Value::String(v.into()))
                .collect(),
        );
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ToolCategory,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl ToolDefinition {
    pub fn new(id: &str, name: &str, category: ToolCategory, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category,
            version: default_version(),
            parameters: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }
}

/// Rolling usage statistics for one tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolUsage {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ToolUsage {
    /// Fold one call into the running averages (`avg += (x - avg) / n`).
    pub fn record(&mut self, success: bool, response_ms: f64, at: DateTime<Utc>) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }
        let n = self.total_calls as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate += (outcome - self.success_rate) / n;
        self.avg_response_ms += (response_ms - self.avg_response_ms) / n;
        self.last_used = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_incremental_means() {
        let mut usage = ToolUsage::default();
        let now = Utc::now();
        usage.record(true, 100.0, now);
        usage.record(false, 300.0, now);
        usage.record(true, 200.0, now);

        assert_eq!(usage.total_calls, 3);
        assert_eq!(usage.successful_calls, 2);
        assert_eq!(usage.failed_calls, 1);
        assert!((usage.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((usage.avg_response_ms - 200.0).abs() < 1e-9);
        assert_eq!(usage.last_used, Some(now));
    }

    #[test]
    fn parameter_spec_from_json() {
        let spec: ParameterSpec = serde_json::from_value(serde_json::json!({
            "name": "side",
            "type": "string",
            "required": true,
            "allowed": ["buy", "sell"]
        }))
        .unwrap();
        assert_eq!(spec.param_type, ParamType::String);
        assert_eq!(spec.allowed.as_ref().map(Vec::len), Some(2));
        assert!(spec.min.is_none());
    }

    #[test]
    fn definition_defaults() {
        let def: ToolDefinition = serde_json::from_value(serde_json::json!({
            "id": "get_order_book_depth",
            "name": "Order Book Depth",
            "category": "market_analysis"
        }))
        .unwrap();
        assert!(def.enabled);
        assert_eq!(def.version, "1.0.0");
        assert!(def.parameters.is_empty());
    }
}

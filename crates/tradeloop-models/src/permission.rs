use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCategory;

/// Coarse capability an agent is configured with. Each grants tool categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Trading,
    Analysis,
    Portfolio,
    Risk,
}

impl Capability {
    pub fn categories(&self) -> &'static [ToolCategory] {
        match self {
            Capability::Trading => &[ToolCategory::TradeExecution, ToolCategory::MarketAnalysis],
            Capability::Analysis => &[ToolCategory::MarketAnalysis, ToolCategory::MarketScanning],
            Capability::Portfolio => &[
                ToolCategory::PortfolioManagement,
                ToolCategory::PerformanceTracking,
            ],
            Capability::Risk => &[ToolCategory::RiskAssessment],
        }
    }
}

/// Call quotas. Zero means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quota {
    #[serde(default = "default_per_minute")]
    pub max_calls_per_minute: u32,
    #[serde(default = "default_per_day")]
    pub max_calls_per_day: u32,
    /// Extra per-tool minute window on top of the agent-wide one.
    #[serde(default)]
    pub max_calls_per_tool_per_minute: Option<u32>,
}

fn default_per_minute() -> u32 {
    60
}

fn default_per_day() -> u32 {
    10_000
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_calls_per_minute: default_per_minute(),
            max_calls_per_day: default_per_day(),
            max_calls_per_tool_per_minute: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerbosity {
    /// Identity, timing and outcome only; parameters and results are dropped.
    Minimal,
    /// Parameters kept, results dropped.
    #[default]
    Standard,
    /// Parameters and results kept.
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditPolicy {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub verbosity: AuditVerbosity,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_audit_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            verbosity: AuditVerbosity::default(),
            retention_days: default_retention_days(),
        }
    }
}

/// Permission settings as configured on an agent; the source for a `PermissionSet`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PermissionProfile {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Tool ids granted individually, regardless of category.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub blocked_tools: Vec<String>,
    #[serde(default)]
    pub quota: Quota,
    #[serde(default)]
    pub audit: AuditPolicy,
}

/// The authorization and quota policy in force for one agent.
///
/// Built only through [`PermissionSet::derive`] and replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionSet {
    pub agent_id: String,
    pub allowed_tools: BTreeSet<String>,
    pub allowed_categories: BTreeSet<ToolCategory>,
    pub blocked_tools: BTreeSet<String>,
    pub quota: Quota,
    pub audit: AuditPolicy,
    pub created_at: DateTime<Utc>,
}

impl PermissionSet {
    pub fn derive(agent_id: &str, profile: &PermissionProfile) -> Self {
        let allowed_categories = profile
            .capabilities
            .iter()
            .flat_map(|c| c.categories().iter().copied())
            .collect();

        Self {
            agent_id: agent_id.to_string(),
            allowed_tools: profile.allowed_tools.iter().cloned().collect(),
            allowed_categories,
            blocked_tools: profile.blocked_tools.iter().cloned().collect(),
            quota: profile.quota,
            audit: profile.audit,
            created_at: Utc::now(),
        }
    }

    /// Whether this set names `tool_id` explicitly (allowed or blocked).
    pub fn references(&self, tool_id: &str) -> bool {
        self.allowed_tools.contains(tool_id) || self.blocked_tools.contains(tool_id)
    }
}

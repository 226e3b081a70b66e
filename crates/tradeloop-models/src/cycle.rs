use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Decision;

/// Which inputs a cycle saw, without copying the snapshots themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRef {
    pub market_captured_at: DateTime<Utc>,
    pub portfolio_captured_at: DateTime<Utc>,
    /// Sources that fell back to cached or default data ("market", "portfolio", "memory").
    pub degraded_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Approved,
    Rejected { reasons: Vec<String> },
    /// No decision was produced, so nothing was validated.
    Skipped,
}

impl ValidationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ValidationOutcome::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    NotAttempted,
    Executed {
        call_id: Uuid,
        tool_id: String,
        result: serde_json::Value,
    },
    Failed {
        tool_id: String,
        error: String,
    },
    /// The agent left `Active` before execution; no order was sent.
    Suppressed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Executed,
    NoAction,
    Rejected,
    Suppressed,
    Cancelled,
    Failed,
}

impl CycleOutcome {
    /// Whether the cycle counts toward `successful_decisions`.
    ///
    /// `Cancelled` returns None: a cycle aborted by pause/stop is not counted at all.
    pub fn counts_as_success(&self) -> Option<bool> {
        match self {
            CycleOutcome::Executed
            | CycleOutcome::NoAction
            | CycleOutcome::Rejected
            | CycleOutcome::Suppressed => Some(true),
            CycleOutcome::Failed => Some(false),
            CycleOutcome::Cancelled => None,
        }
    }
}

/// One record per fired cycle. Never mutated after it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionCycleRecord {
    pub cycle_id: Uuid,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inputs: Option<SnapshotRef>,
    pub decision: Option<Decision>,
    pub validation: ValidationOutcome,
    pub execution: ExecutionOutcome,
    pub outcome: CycleOutcome,
    pub error: Option<String>,
    pub latency_ms: u64,
}

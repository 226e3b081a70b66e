use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::AuditVerbosity;

/// Classification of a failed tool call, mirrored by the gateway's error type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    NotRegistered,
    NoActiveSession,
    ToolUnavailable,
    PermissionDenied,
    RateLimited,
    InvalidParameters,
    Timeout,
    ExecutionFailed,
}

impl CallErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorKind::NotRegistered => "not_registered",
            CallErrorKind::NoActiveSession => "no_active_session",
            CallErrorKind::ToolUnavailable => "tool_unavailable",
            CallErrorKind::PermissionDenied => "permission_denied",
            CallErrorKind::RateLimited => "rate_limited",
            CallErrorKind::InvalidParameters => "invalid_parameters",
            CallErrorKind::Timeout => "timeout",
            CallErrorKind::ExecutionFailed => "execution_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallError {
    pub kind: CallErrorKind,
    pub message: String,
}

/// Ledger entry for one gateway call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    pub id: Uuid,
    pub agent_id: String,
    pub tool_id: String,
    pub session_id: Option<Uuid>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<CallError>,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CallRecord {
    /// Drop the payload fields the audit verbosity does not keep.
    pub fn redacted(mut self, verbosity: AuditVerbosity) -> Self {
        match verbosity {
            AuditVerbosity::Full => {}
            AuditVerbosity::Standard => {
                self.result = None;
            }
            AuditVerbosity::Minimal => {
                self.parameters = serde_json::Value::Null;
                self.result = None;
            }
        }
        self
    }
}

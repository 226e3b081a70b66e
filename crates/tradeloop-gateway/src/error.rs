use thiserror::Error;
use tradeloop_models::CallErrorKind;

use crate::rate_limit::RateScope;

/// Why a gateway call did not produce a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Agent not registered with the gateway: {agent_id}")]
    NotRegistered { agent_id: String },

    #[error("No active session for agent {agent_id}")]
    NoActiveSession { agent_id: String },

    #[error("Tool unavailable: {tool_id}")]
    ToolUnavailable { tool_id: String },

    #[error("Agent {agent_id} is not permitted to call {tool_id}")]
    PermissionDenied { agent_id: String, tool_id: String },

    #[error("Rate limit exceeded ({scope}), retry after {retry_after_ms} ms")]
    RateLimited {
        scope: RateScope,
        retry_after_ms: u64,
    },

    #[error("Invalid parameters for {tool_id}: {}", violations.join("; "))]
    InvalidParameters {
        tool_id: String,
        violations: Vec<String>,
    },

    #[error("Tool {tool_id} timed out after {timeout_ms} ms")]
    Timeout { tool_id: String, timeout_ms: u64 },

    #[error("Tool {tool_id} failed: {message}")]
    ExecutionFailed { tool_id: String, message: String },
}

impl GatewayError {
    pub fn kind(&self) -> CallErrorKind {
        match self {
            GatewayError::NotRegistered { .. } => CallErrorKind::NotRegistered,
            GatewayError::NoActiveSession { .. } => CallErrorKind::NoActiveSession,
            GatewayError::ToolUnavailable { .. } => CallErrorKind::ToolUnavailable,
            GatewayError::PermissionDenied { .. } => CallErrorKind::PermissionDenied,
            GatewayError::RateLimited { .. } => CallErrorKind::RateLimited,
            GatewayError::InvalidParameters { .. } => CallErrorKind::InvalidParameters,
            GatewayError::Timeout { .. } => CallErrorKind::Timeout,
            GatewayError::ExecutionFailed { .. } => CallErrorKind::ExecutionFailed,
        }
    }

    /// Failures that may succeed on a later attempt without any config change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Timeout { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Tool {tool_id} is referenced by permission sets of: {}", agents.join(", "))]
    InUse { tool_id: String, agents: Vec<String> },
}

/// Error returned by a tool implementation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ToolFailure(pub String);

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_lists_every_violation() {
        let err = GatewayError::InvalidParameters {
            tool_id: "execute_smart_order".to_string(),
            violations: vec![
                "missing required parameter `side`".to_string(),
                "unknown parameter `leverage`".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for execute_smart_order: missing required parameter `side`; unknown parameter `leverage`"
        );
        assert_eq!(err.kind(), CallErrorKind::InvalidParameters);
        assert!(!err.is_transient());
    }

    #[test]
    fn rate_limited_is_transient() {
        let err = GatewayError::RateLimited {
            scope: RateScope::Minute,
            retry_after_ms: 1_500,
        };
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded (per-minute), retry after 1500 ms"
        );
    }
}

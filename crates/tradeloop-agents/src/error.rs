use thiserror::Error;
use tradeloop_gateway::GatewayError;
use tradeloop_models::AgentStatus;

use crate::lifecycle::LifecycleAction;

/// Failures of the external collaborators a cycle depends on.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Decision parse error: {0}")]
    Parse(String),

    #[error("Provider timed out after {0} ms")]
    Timeout(u64),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Cannot {action} agent {agent_id} while {from}")]
    InvalidTransition {
        agent_id: String,
        from: AgentStatus,
        action: LifecycleAction,
    },

    #[error("Agent {agent_id} is {status}, not active")]
    NotActive {
        agent_id: String,
        status: AgentStatus,
    },

    #[error("Agent {0} already has a cycle in flight")]
    CycleInFlight(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

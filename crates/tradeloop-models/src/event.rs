use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cycle::CycleOutcome;

/// Observable events emitted by the scheduler and gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    AgentActivated {
        agent_id: String,
        session_id: Uuid,
    },
    AgentDeactivated {
        agent_id: String,
        session_id: Option<Uuid>,
    },
    CycleCompleted {
        agent_id: String,
        cycle_id: Uuid,
        outcome: CycleOutcome,
        latency_ms: u64,
    },
    CycleSkipped {
        agent_id: String,
    },
    DecisionRejected {
        agent_id: String,
        cycle_id: Uuid,
        reasons: Vec<String>,
    },
    ToolCallCompleted {
        agent_id: String,
        tool_id: String,
        call_id: Uuid,
        success: bool,
    },
    AgentErrored {
        agent_id: String,
        error_count: u64,
    },
}

impl CoreEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            CoreEvent::AgentActivated { agent_id, .. }
            | CoreEvent::AgentDeactivated { agent_id, .. }
            | CoreEvent::CycleCompleted { agent_id, .. }
            | CoreEvent::CycleSkipped { agent_id }
            | CoreEvent::DecisionRejected { agent_id, .. }
            | CoreEvent::ToolCallCompleted { agent_id, .. }
            | CoreEvent::AgentErrored { agent_id, .. } => agent_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tagging() {
        let event = CoreEvent::AgentErrored {
            agent_id: "agent-7".to_string(),
            error_count: 11,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "agent_errored");
        assert_eq!(event.agent_id(), "agent-7");
    }
}

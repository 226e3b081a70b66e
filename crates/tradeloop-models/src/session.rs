use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
    Timeout,
}

/// Execution context tracking one agent's tool calls between activation and deactivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub tools_used: BTreeSet<String>,
    pub status: SessionStatus,
}

impl Session {
    pub fn open(agent_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            tools_used: BTreeSet::new(),
            status: SessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn record_call(&mut self, tool_id: &str, success: bool) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
        }
        if !self.tools_used.contains(tool_id) {
            self.tools_used.insert(tool_id.to_string());
        }
    }

    pub fn close(&mut self, status: SessionStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_close() {
        let mut session = Session::open("agent-1");
        session.record_call("execute_smart_order", true);
        session.record_call("execute_smart_order", false);
        session.record_call("get_portfolio_positions", true);

        assert_eq!(session.total_calls, 3);
        assert_eq!(session.successful_calls, 2);
        assert_eq!(session.failed_calls, 1);
        assert_eq!(session.tools_used.len(), 2);
        assert!(session.is_active());

        session.close(SessionStatus::Completed);
        assert!(!session.is_active());
        assert!(session.ended_at.is_some());
    }
}

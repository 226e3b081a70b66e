use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tradeloop_models::{Session, SessionStatus};
use uuid::Uuid;

#[derive(Debug, Default)]
struct AgentSessions {
    active: Option<Session>,
    closed: VecDeque<Session>,
}

/// Tracks at most one active session per agent plus a bounded history of closed ones.
///
/// Each agent's sessions sit behind their own lock; the outer map is only held
/// long enough to find or create the entry.
#[derive(Debug)]
pub struct SessionManager {
    agents: Mutex<HashMap<String, Arc<Mutex<AgentSessions>>>>,
    history_limit: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionManager {
    /// `history_limit` bounds the closed sessions kept per agent.
    pub fn new(history_limit: usize) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    fn entry(&self, agent_id: &str) -> Arc<Mutex<AgentSessions>> {
        lock(&self.agents)
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, agent_id: &str) -> Option<Arc<Mutex<AgentSessions>>> {
        lock(&self.agents).get(agent_id).cloned()
    }

    /// Open a session for `agent_id`, or return the one already active.
    ///
    /// The flag is true when a new session was created.
    pub fn open(&self, agent_id: &str) -> (Session, bool) {
        let entry = self.entry(agent_id);
        let mut sessions = lock(&entry);
        if let Some(existing) = &sessions.active {
            return (existing.clone(), false);
        }
        let session = Session::open(agent_id);
        sessions.active = Some(session.clone());
        (session, true)
    }

    pub fn active(&self, agent_id: &str) -> Option<Session> {
        let entry = self.existing(agent_id)?;
        let sessions = lock(&entry);
        sessions.active.clone()
    }

    pub fn active_id(&self, agent_id: &str) -> Option<Uuid> {
        let entry = self.existing(agent_id)?;
        let sessions = lock(&entry);
        sessions.active.as_ref().map(|s| s.id)
    }

    /// Count a call against the agent's active session. Returns the updated session.
    pub fn record_call(&self, agent_id: &str, tool_id: &str, success: bool) -> Option<Session> {
        let entry = self.existing(agent_id)?;
        let mut sessions = lock(&entry);
        let session = sessions.active.as_mut()?;
        session.record_call(tool_id, success);
        Some(session.clone())
    }

    /// Close the active session with `status`. None when no session is active.
    pub fn close(&self, agent_id: &str, status: SessionStatus) -> Option<Session> {
        let entry = self.existing(agent_id)?;
        let mut sessions = lock(&entry);
        let mut session = sessions.active.take()?;
        session.close(status);

        if self.history_limit > 0 {
            if sessions.closed.len() >= self.history_limit {
                sessions.closed.pop_front();
            }
            sessions.closed.push_back(session.clone());
        }
        Some(session)
    }

    /// Closed sessions for `agent_id`, newest first.
    pub fn history(&self, agent_id: &str) -> Vec<Session> {
        let Some(entry) = self.existing(agent_id) else {
            return Vec::new();
        };
        let sessions = lock(&entry);
        sessions.closed.iter().rev().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        let entries: Vec<_> = lock(&self.agents).values().cloned().collect();
        entries
            .into_iter()
            .filter(|entry| lock(&**entry).active.is_some())
            .count()
    }
}

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tradeloop_models::CallRecord;

/// Bounded, append-only ledger of gateway calls. Oldest records are evicted first.
pub struct AuditLog {
    entries: Mutex<VecDeque<CallRecord>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CallRecord>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn append(&self, record: CallRecord) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<CallRecord> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Newest first, only `agent_id`.
    pub fn for_agent(&self, agent_id: &str, limit: usize) -> Vec<CallRecord> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| r.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

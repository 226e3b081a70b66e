use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tradeloop_models::{AgentStatusRecord, CallRecord, DecisionCycleRecord, Session};

use crate::error::StoreError;
use crate::persistence::Persistence;

/// In-memory fallback tier backed by moka.
///
/// Records are stored as JSON under `{kind}:{id}` keys and evicted by
/// capacity or TTL.
pub struct MemoryStore {
    inner: Cache<String, String>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn put<T: Serialize>(&self, key: String, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.inner.insert(key, json).await;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.inner.get(key).await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn agent_status(
        &self,
        agent_id: &str,
    ) -> Result<Option<AgentStatusRecord>, StoreError> {
        self.get(&format!("agent_status:{agent_id}")).await
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Pending maintenance is applied first so the count reflects recent writes.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn save_agent_status(&self, record: &AgentStatusRecord) -> Result<(), StoreError> {
        self.put(format!("agent_status:{}", record.agent_id), record)
            .await
    }

    async fn save_call_record(&self, record: &CallRecord) -> Result<(), StoreError> {
        self.put(format!("call:{}", record.id), record).await
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.put(format!("session:{}", session.id), session).await
    }

    async fn save_cycle_record(&self, record: &DecisionCycleRecord) -> Result<(), StoreError> {
        self.put(format!("cycle:{}", record.cycle_id), record).await
    }
}

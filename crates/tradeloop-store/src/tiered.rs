use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use tradeloop_models::{AgentStatusRecord, CallRecord, DecisionCycleRecord, Session};

use crate::error::StoreError;
use crate::persistence::Persistence;

/// Two-tier persistence: primary first, fallback when the primary fails or is absent.
///
/// Returns an error only when the fallback also fails.
pub struct TieredStore {
    primary: Option<Arc<dyn Persistence>>,
    fallback: Arc<dyn Persistence>,
}

impl TieredStore {
    pub fn new(primary: Option<Arc<dyn Persistence>>, fallback: Arc<dyn Persistence>) -> Self {
        Self { primary, fallback }
    }

    /// No primary configured: every write goes to the fallback.
    pub fn fallback_only(fallback: Arc<dyn Persistence>) -> Self {
        Self::new(None, fallback)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

fn primary_failed(kind: &str, error: &StoreError) {
    warn!(record = kind, error = %error, "Primary store write failed, using fallback");
}

#[async_trait]
impl Persistence for TieredStore {
    async fn save_agent_status(&self, record: &AgentStatusRecord) -> Result<(), StoreError> {
        if let Some(primary) = &self.primary {
            match primary.save_agent_status(record).await {
                Ok(()) => return Ok(()),
                Err(e) => primary_failed("agent_status", &e),
            }
        }
        self.fallback.save_agent_status(record).await
    }

    async fn save_call_record(&self, record: &CallRecord) -> Result<(), StoreError> {
        if let Some(primary) = &self.primary {
            match primary.save_call_record(record).await {
                Ok(()) => return Ok(()),
                Err(e) => primary_failed("call_record", &e),
            }
        }
        self.fallback.save_call_record(record).await
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(primary) = &self.primary {
            match primary.save_session(session).await {
                Ok(()) => return Ok(()),
                Err(e) => primary_failed("session", &e),
            }
        }
        self.fallback.save_session(session).await
    }

    async fn save_cycle_record(&self, record: &DecisionCycleRecord) -> Result<(), StoreError> {
        if let Some(primary) = &self.primary {
            match primary.save_cycle_record(record).await {
                Ok(()) => return Ok(()),
                Err(e) => primary_failed("cycle_record", &e),
            }
        }
        self.fallback.save_cycle_record(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::sqlite::SqliteStore;
    use chrono::Utc;
    use std::time::Duration;
    use tradeloop_models::{AgentStatus, Performance};

    struct BrokenStore;

    #[async_trait]
    impl Persistence for BrokenStore {
        async fn save_agent_status(&self, _: &AgentStatusRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
        async fn save_call_record(&self, _: &CallRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
        async fn save_session(&self, _: &Session) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
        async fn save_cycle_record(&self, _: &DecisionCycleRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    fn status() -> AgentStatusRecord {
        AgentStatusRecord {
            agent_id: "agent-1".to_string(),
            status: AgentStatus::Paused,
            performance: Performance::default(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = Arc::new(SqliteStore::open_in_memory().unwrap());
        let fallback = Arc::new(MemoryStore::new(100, Duration::from_secs(60)));
        let store = TieredStore::new(
            Some(primary.clone() as Arc<dyn Persistence>),
            fallback.clone(),
        );

        store.save_agent_status(&status()).await.unwrap();

        assert!(primary.agent_status("agent-1").unwrap().is_some());
        assert!(fallback.agent_status("agent-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn primary_failure_lands_in_fallback() {
        let fallback = Arc::new(MemoryStore::new(100, Duration::from_secs(60)));
        let store = TieredStore::new(
            Some(Arc::new(BrokenStore) as Arc<dyn Persistence>),
            fallback.clone(),
        );

        store.save_agent_status(&status()).await.unwrap();

        let loaded = fallback.agent_status("agent-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, AgentStatus::Paused);
    }

    #[tokio::test]
    async fn both_tiers_failing_is_an_error() {
        let store = TieredStore::new(
            Some(Arc::new(BrokenStore) as Arc<dyn Persistence>),
            Arc::new(BrokenStore),
        );
        let result = store.save_session(&Session::open("agent-1")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn fallback_only_store() {
        let fallback = Arc::new(MemoryStore::new(100, Duration::from_secs(60)));
        let store = TieredStore::fallback_only(fallback.clone());
        assert!(!store.has_primary());
        store.save_agent_status(&status()).await.unwrap();
        assert!(fallback.agent_status("agent-1").await.unwrap().is_some());
    }
}

use async_trait::async_trait;
use tradeloop_models::{AgentStatusRecord, CallRecord, DecisionCycleRecord, Session};

use crate::error::StoreError;

/// Write side of the persistence boundary.
///
/// Callers treat every method as best-effort: an `Err` is logged and the
/// operation that produced the record carries on.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_agent_status(&self, record: &AgentStatusRecord) -> Result<(), StoreError>;

    async fn save_call_record(&self, record: &CallRecord) -> Result<(), StoreError>;

    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn save_cycle_record(&self, record: &DecisionCycleRecord) -> Result<(), StoreError>;
}

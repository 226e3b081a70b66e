use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tradeloop_models::{
    AgentStatus, AgentStatusRecord, CallRecord, DecisionCycleRecord, Performance, Session,
};

use crate::error::StoreError;
use crate::persistence::Persistence;
use crate::schema::{timestamp, STORE_DDL};

/// Primary store: one SQLite database in WAL mode.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(STORE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(STORE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn upsert_agent_status(&self, record: &AgentStatusRecord) -> Result<(), StoreError> {
        let performance = serde_json::to_string(&record.performance)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO agent_status (agent_id, status, performance_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                record.agent_id,
                record.status.as_str(),
                performance,
                timestamp(record.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn agent_status(&self, agent_id: &str) -> Result<Option<AgentStatusRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT status, performance_json, updated_at FROM agent_status WHERE agent_id = ?1",
        )?;
        let row = stmt
            .query_row(rusqlite::params![agent_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .optional()?;

        let Some((status, performance, updated_at)) = row else {
            return Ok(None);
        };

        let status: AgentStatus = serde_json::from_value(serde_json::Value::String(status))?;
        let performance: Performance = serde_json::from_str(&performance)?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|_| StoreError::InvalidValue {
                column: "agent_status.updated_at",
                value: updated_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Some(AgentStatusRecord {
            agent_id: agent_id.to_string(),
            status,
            performance,
            updated_at,
        }))
    }

    pub fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        let status = serde_json::to_value(session.status)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO sessions (id, agent_id, status, started_at, ended_at, record_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                session.id.to_string(),
                session.agent_id,
                status.as_str().unwrap_or_default(),
                timestamp(session.started_at),
                session.ended_at.map(timestamp),
                json,
            ],
        )?;
        Ok(())
    }

    /// Sessions for an agent, newest first.
    pub fn sessions_for_agent(&self, agent_id: &str) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT record_json FROM sessions WHERE agent_id = ?1 ORDER BY started_at DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    pub fn insert_call_record(&self, record: &CallRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO call_records \
             (id, agent_id, tool_id, session_id, success, started_at, record_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.id.to_string(),
                record.agent_id,
                record.tool_id,
                record.session_id.map(|id| id.to_string()),
                record.success,
                timestamp(record.started_at),
                json,
            ],
        )?;
        Ok(())
    }

    /// Most recent call records for an agent, newest first.
    pub fn call_records_for_agent(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CallRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT record_json FROM call_records WHERE agent_id = ?1 \
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    pub fn count_call_records(&self) -> Result<usize, StoreError> {
        let count: usize =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM call_records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete call records started before `cutoff`. Returns the number of rows deleted.
    pub fn purge_call_records_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn()?.execute(
            "DELETE FROM call_records WHERE started_at < ?1",
            rusqlite::params![timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    pub fn insert_cycle_record(&self, record: &DecisionCycleRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        let outcome = serde_json::to_value(record.outcome)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO cycle_records (cycle_id, agent_id, outcome, started_at, record_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.cycle_id.to_string(),
                record.agent_id,
                outcome.as_str().unwrap_or_default(),
                timestamp(record.started_at),
                json,
            ],
        )?;
        Ok(())
    }

    /// Most recent cycle records for an agent, newest first.
    pub fn cycle_records_for_agent(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<DecisionCycleRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT record_json FROM cycle_records WHERE agent_id = ?1 \
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn save_agent_status(&self, record: &AgentStatusRecord) -> Result<(), StoreError> {
        self.upsert_agent_status(record)
    }

    async fn save_call_record(&self, record: &CallRecord) -> Result<(), StoreError> {
        self.insert_call_record(record)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.upsert_session(session)
    }

    async fn save_cycle_record(&self, record: &DecisionCycleRecord) -> Result<(), StoreError> {
        self.insert_cycle_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tradeloop_models::{CycleOutcome, ExecutionOutcome, SessionStatus, ValidationOutcome};
    use uuid::Uuid;

    fn call_record(agent_id: &str, started_at: DateTime<Utc>) -> CallRecord {
        CallRecord {
            id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            tool_id: "execute_smart_order".to_string(),
            session_id: None,
            parameters: serde_json::json!({"symbol": "AAPL"}),
            result: None,
            error: None,
            success: true,
            started_at,
            finished_at: started_at,
            duration_ms: 3,
        }
    }

    #[test]
    fn agent_status_upsert_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut record = AgentStatusRecord {
            agent_id: "agent-1".to_string(),
            status: AgentStatus::Active,
            performance: Performance::default(),
            updated_at: Utc::now(),
        };
        store.upsert_agent_status(&record).unwrap();

        record.status = AgentStatus::Error;
        record.performance.total_decisions = 12;
        store.upsert_agent_status(&record).unwrap();

        let loaded = store.agent_status("agent-1").unwrap().unwrap();
        assert_eq!(loaded.status, AgentStatus::Error);
        assert_eq!(loaded.performance.total_decisions, 12);
        assert!(store.agent_status("missing").unwrap().is_none());
    }

    #[test]
    fn call_records_newest_first_with_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_call_record(&call_record("agent-1", base + Duration::seconds(i)))
                .unwrap();
        }
        store
            .insert_call_record(&call_record("agent-2", base))
            .unwrap();

        let records = store.call_records_for_agent("agent-1", 3).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].started_at > records[1].started_at);
        assert_eq!(store.count_call_records().unwrap(), 6);
    }

    #[test]
    fn purge_removes_only_old_records() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .insert_call_record(&call_record("agent-1", now - Duration::days(40)))
            .unwrap();
        store
            .insert_call_record(&call_record("agent-1", now - Duration::days(31)))
            .unwrap();
        store
            .insert_call_record(&call_record("agent-1", now - Duration::days(2)))
            .unwrap();

        let deleted = store
            .purge_call_records_before(now - Duration::days(30))
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_call_records().unwrap(), 1);
    }

    #[test]
    fn session_round_trip_through_json_column() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut session = Session::open("agent-1");
        session.record_call("get_portfolio_positions", true);
        store.upsert_session(&session).unwrap();

        session.close(SessionStatus::Completed);
        store.upsert_session(&session).unwrap();

        let sessions = store.sessions_for_agent("agent-1").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].total_calls, 1);
    }

    #[test]
    fn cycle_records_by_agent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let record = DecisionCycleRecord {
            cycle_id: Uuid::new_v4(),
            agent_id: "agent-1".to_string(),
            started_at: now,
            finished_at: now,
            inputs: None,
            decision: None,
            validation: ValidationOutcome::Skipped,
            execution: ExecutionOutcome::NotAttempted,
            outcome: CycleOutcome::Failed,
            error: Some("provider timed out".to_string()),
            latency_ms: 60_000,
        };
        store.insert_cycle_record(&record).unwrap();

        let loaded = store.cycle_records_for_agent("agent-1", 10).unwrap();
        assert_eq!(loaded, vec![record]);
    }
}

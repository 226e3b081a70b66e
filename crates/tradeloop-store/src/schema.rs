use chrono::{DateTime, SecondsFormat, Utc};

/// Tables owned by the daemon's SQLite store.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS agent_status (
///     agent_id          TEXT PRIMARY KEY,
///     status            TEXT NOT NULL,
///     performance_json  TEXT NOT NULL,
///     updated_at        TEXT NOT NULL
/// );
/// CREATE TABLE IF NOT EXISTS sessions (
///     id           TEXT PRIMARY KEY,
///     agent_id     TEXT NOT NULL,
///     status       TEXT NOT NULL,
///     started_at   TEXT NOT NULL,
///     ended_at     TEXT,
///     record_json  TEXT NOT NULL
/// );
/// CREATE TABLE IF NOT EXISTS call_records ( ... );
/// CREATE TABLE IF NOT EXISTS cycle_records ( ... );
/// ```
///
/// Full records are kept as JSON next to the columns used for lookup and compaction.
pub const STORE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS agent_status (
    agent_id          TEXT PRIMARY KEY,
    status            TEXT NOT NULL,
    performance_json  TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sessions (
    id           TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL,
    status       TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    ended_at     TEXT,
    record_json  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id);
CREATE TABLE IF NOT EXISTS call_records (
    id           TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL,
    tool_id      TEXT NOT NULL,
    session_id   TEXT,
    success      INTEGER NOT NULL,
    started_at   TEXT NOT NULL,
    record_json  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_calls_agent ON call_records(agent_id);
CREATE INDEX IF NOT EXISTS idx_calls_started ON call_records(started_at);
CREATE TABLE IF NOT EXISTS cycle_records (
    cycle_id     TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    record_json  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cycles_agent ON cycle_records(agent_id);
";

/// Quote table written by an external market-data pipeline.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS market_quotes (
///     symbol      TEXT PRIMARY KEY,
///     price       TEXT NOT NULL,   -- decimal string
///     volume      TEXT,
///     as_of       TEXT NOT NULL,
///     expires_at  TEXT NOT NULL
/// );
/// ```
pub const QUOTES_DDL: &str = "\
CREATE TABLE IF NOT EXISTS market_quotes (
    symbol      TEXT PRIMARY KEY,
    price       TEXT NOT NULL,
    volume      TEXT,
    as_of       TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_quotes_expires ON market_quotes(expires_at);
";

/// Fixed-width UTC timestamp so stored values compare correctly as text.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 30, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        assert_eq!(timestamp(a), "2026-01-01T09:30:00.000Z");
        assert!(timestamp(a) < timestamp(b));
    }
}

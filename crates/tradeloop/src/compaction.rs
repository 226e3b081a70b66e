use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tradeloop_store::{SqliteStore, StoreError};

/// Delete persisted call records older than `retention_days` before `now`.
pub fn compact_call_records(
    store: &SqliteStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let cutoff = now - chrono::Duration::days(i64::from(retention_days));
    store.purge_call_records_before(cutoff)
}

/// Periodically enforce call-record retention until cancelled.
pub async fn compaction_loop(
    store: Arc<SqliteStore>,
    retention_days: u32,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Compaction loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match compact_call_records(&store, retention_days, Utc::now()) {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, retention_days, "Purged expired call records");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Call record compaction failed");
                    }
                }
            }
        }
    }
}

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use tradeloop_models::Quote;

use crate::error::StoreError;
use crate::schema::{timestamp, QUOTES_DDL};

/// SQLite accessor for the `market_quotes` table.
///
/// The table is written by an external market-data pipeline; the daemon only reads it.
pub struct QuoteTable {
    conn: Connection,
}

impl QuoteTable {
    /// Open the pipeline's database read-only.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Writable in-memory table with the schema applied. Used by tests to seed quotes.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUOTES_DDL)?;
        Ok(Self { conn })
    }

    /// Open read-write, creating the table if needed.
    pub fn open_writable(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(QUOTES_DDL)?;
        Ok(Self { conn })
    }

    /// Latest unexpired quote for `symbol`.
    pub fn get(&self, symbol: &str) -> Result<Option<Quote>, StoreError> {
        let now = timestamp(Utc::now());
        let mut stmt = self.conn.prepare_cached(
            "SELECT price, volume, as_of FROM market_quotes \
             WHERE symbol = ?1 AND expires_at > ?2",
        )?;
        let row = stmt
            .query_row(rusqlite::params![symbol, now], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .optional()?;

        let Some((price, volume, as_of)) = row else {
            return Ok(None);
        };

        Ok(Some(Quote {
            price: parse_decimal("market_quotes.price", &price)?,
            volume: volume
                .map(|v| parse_decimal("market_quotes.volume", &v))
                .transpose()?,
            as_of: DateTime::parse_from_rfc3339(&as_of)
                .map_err(|_| StoreError::InvalidValue {
                    column: "market_quotes.as_of",
                    value: as_of.clone(),
                })?
                .with_timezone(&Utc),
        }))
    }

    pub fn upsert(&self, symbol: &str, quote: &Quote, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        self.conn.execute(
            "INSERT OR REPLACE INTO market_quotes (symbol, price, volume, as_of, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                symbol,
                quote.price.to_string(),
                quote.volume.map(|v| v.to_string()),
                timestamp(quote.as_of),
                timestamp(Utc::now() + ttl),
            ],
        )?;
        Ok(())
    }
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|_| StoreError::InvalidValue {
        column,
        value: value.to_string(),
    })
}

/// Read-through quote cache: moka (hot) then SQLite.
///
/// SQLite hits are promoted to moka so repeated cycles within the TTL skip the database.
pub struct QuoteReader {
    hot: Cache<String, Quote>,
    table: Mutex<QuoteTable>,
}

impl QuoteReader {
    pub fn new(table: QuoteTable, max_capacity: u64, hot_ttl: Duration) -> Self {
        Self {
            hot: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(hot_ttl)
                .build(),
            table: Mutex::new(table),
        }
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<Quote>, StoreError> {
        if let Some(quote) = self.hot.get(symbol).await {
            return Ok(Some(quote));
        }

        let quote = {
            let table = self
                .table
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            table.get(symbol)?
        };

        if let Some(quote) = &quote {
            self.hot.insert(symbol.to_string(), quote.clone()).await;
        }
        Ok(quote)
    }

    /// Quotes for every symbol that has one; missing symbols are left out.
    pub async fn get_many(&self, symbols: &[String]) -> Result<Vec<(String, Quote)>, StoreError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(quote) = self.get(symbol).await? {
                quotes.push((symbol.clone(), quote));
            }
        }
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> Quote {
        Quote {
            price,
            volume: Some(dec!(1000000)),
            as_of: Utc::now(),
        }
    }

    #[test]
    fn get_existing_and_expired() {
        let table = QuoteTable::open_in_memory().unwrap();
        table
            .upsert("AAPL", &quote(dec!(150.25)), Duration::from_secs(300))
            .unwrap();
        table
            .upsert("TSLA", &quote(dec!(240.10)), Duration::ZERO)
            .unwrap();

        let aapl = table.get("AAPL").unwrap().unwrap();
        assert_eq!(aapl.price, dec!(150.25));
        assert_eq!(aapl.volume, Some(dec!(1000000)));
        assert!(table.get("TSLA").unwrap().is_none());
        assert!(table.get("MSFT").unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_promotes_to_hot_cache() {
        let table = QuoteTable::open_in_memory().unwrap();
        table
            .upsert("AAPL", &quote(dec!(150.25)), Duration::from_secs(300))
            .unwrap();
        let reader = QuoteReader::new(table, 100, Duration::from_secs(60));

        let first = reader.get("AAPL").await.unwrap().unwrap();
        assert_eq!(first.price, dec!(150.25));
        assert!(reader.hot.get("AAPL").await.is_some());

        // Hot entry is served even after the row changes underneath.
        reader
            .table
            .lock()
            .unwrap()
            .upsert("AAPL", &quote(dec!(151.00)), Duration::from_secs(300))
            .unwrap();
        let second = reader.get("AAPL").await.unwrap().unwrap();
        assert_eq!(second.price, dec!(150.25));
    }

    #[tokio::test]
    async fn get_many_skips_missing() {
        let table = QuoteTable::open_in_memory().unwrap();
        table
            .upsert("AAPL", &quote(dec!(150.25)), Duration::from_secs(300))
            .unwrap();
        let reader = QuoteReader::new(table, 100, Duration::from_secs(60));

        let quotes = reader
            .get_many(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].0, "AAPL");
    }
}

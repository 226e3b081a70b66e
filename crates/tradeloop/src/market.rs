use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tradeloop_agents::{AgentError, MarketDataProvider};
use tradeloop_models::MarketSnapshot;
use tradeloop_store::QuoteReader;

/// Market snapshots read from the quotes table an external pipeline keeps fresh.
pub struct QuoteMarketProvider {
    quotes: Arc<QuoteReader>,
}

impl QuoteMarketProvider {
    pub fn new(quotes: Arc<QuoteReader>) -> Self {
        Self { quotes }
    }
}

#[async_trait]
impl MarketDataProvider for QuoteMarketProvider {
    async fn market_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, AgentError> {
        let quotes = self
            .quotes
            .get_many(symbols)
            .await
            .map_err(|e| AgentError::Unavailable(format!("quote store: {e}")))?;
        Ok(MarketSnapshot {
            quotes: quotes.into_iter().collect(),
            captured_at: Utc::now(),
            degraded: false,
        })
    }
}

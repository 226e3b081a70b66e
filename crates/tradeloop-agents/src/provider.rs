use async_trait::async_trait;
use tradeloop_models::{
    Agent, Decision, DecisionCycleRecord, DecisionRequest, MarketSnapshot, MemorySnapshot,
    PortfolioSnapshot,
};

use crate::error::AgentError;

/// Produces one structured decision per cycle. Mockable for testing.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn make_decision(&self, request: &DecisionRequest) -> Result<Decision, AgentError>;
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn market_snapshot(&self, symbols: &[String]) -> Result<MarketSnapshot, AgentError>;
}

#[async_trait]
pub trait PortfolioProvider: Send + Sync {
    async fn portfolio_snapshot(&self, agent_id: &str) -> Result<PortfolioSnapshot, AgentError>;
}

#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn memory_snapshot(&self, agent_id: &str) -> Result<MemorySnapshot, AgentError>;
}

/// Called after every recorded cycle.
#[async_trait]
pub trait LearningHook: Send + Sync {
    async fn process_outcome(&self, agent: &Agent, record: &DecisionCycleRecord);
}

/// Memory provider for agents that carry no context between cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMemory;

#[async_trait]
impl MemoryProvider for EmptyMemory {
    async fn memory_snapshot(&self, _agent_id: &str) -> Result<MemorySnapshot, AgentError> {
        Ok(MemorySnapshot::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLearning;

#[async_trait]
impl LearningHook for NoopLearning {
    async fn process_outcome(&self, _agent: &Agent, _record: &DecisionCycleRecord) {}
}

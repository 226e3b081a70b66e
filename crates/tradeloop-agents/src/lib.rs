pub mod claude_cli;
pub mod claude_provider;
pub mod error;
pub mod lifecycle;
pub mod parser;
pub mod prompts;
pub mod provider;
pub mod scheduler;
pub mod validator;

pub mod test_support;

pub use claude_cli::ClaudeCliConfig;
pub use claude_provider::ClaudeDecisionProvider;
pub use error::{AgentError, SchedulerError};
pub use lifecycle::{LifecycleAction, Transition};
pub use provider::{
    DecisionProvider, EmptyMemory, LearningHook, MarketDataProvider, MemoryProvider, NoopLearning,
    PortfolioProvider,
};
pub use scheduler::{AgentScheduler, AgentView, BulkReport, Providers, TimerStats};
pub use validator::{DecisionValidator, ValidationPolicy};

pub mod agent;
pub mod call_record;
pub mod catalog;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod event;
pub mod permission;
pub mod session;
pub mod tool;

pub use agent::{
    Agent, AgentConfig, AgentSpec, AgentStatus, AgentStatusRecord, Performance, StrategyParams,
};
pub use call_record::{CallError, CallErrorKind, CallRecord};
pub use config::{
    GatewayConfig, PaperConfig, ProviderConfig, SchedulerConfig, StoreConfig, TradeloopConfig,
};
pub use cycle::{
    CycleOutcome, DecisionCycleRecord, ExecutionOutcome, SnapshotRef, ValidationOutcome,
};
pub use decision::{
    Decision, DecisionRequest, MarketSnapshot, MemorySnapshot, PortfolioSnapshot, Position, Quote,
    TradeAction,
};
pub use event::CoreEvent;
pub use permission::{
    AuditPolicy, AuditVerbosity, Capability, PermissionProfile, PermissionSet, Quota,
};
pub use session::{Session, SessionStatus};
pub use tool::{ParamType, ParameterSpec, ToolCategory, ToolDefinition, ToolUsage};

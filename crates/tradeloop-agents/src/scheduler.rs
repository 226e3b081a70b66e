use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tradeloop_gateway::{CallContext, EventBus, ToolGateway};
use tradeloop_models::{
    Agent, AgentConfig, AgentStatus, AgentStatusRecord, CoreEvent, CycleOutcome, Decision,
    DecisionCycleRecord, DecisionRequest, ExecutionOutcome, MarketSnapshot, MemorySnapshot,
    PortfolioSnapshot, SchedulerConfig, SnapshotRef, TradeAction, ValidationOutcome,
};
use tradeloop_store::Persistence;
use uuid::Uuid;

use crate::error::{AgentError, SchedulerError};
use crate::lifecycle::{self, LifecycleAction};
use crate::provider::{
    DecisionProvider, EmptyMemory, LearningHook, MarketDataProvider, MemoryProvider, NoopLearning,
    PortfolioProvider,
};
use crate::validator::{resolve_price, DecisionValidator, ValidationPolicy};

/// External collaborators a cycle consults.
#[derive(Clone)]
pub struct Providers {
    pub decisions: Arc<dyn DecisionProvider>,
    pub market: Arc<dyn MarketDataProvider>,
    pub portfolio: Arc<dyn PortfolioProvider>,
    pub memory: Arc<dyn MemoryProvider>,
    pub learning: Arc<dyn LearningHook>,
}

impl Providers {
    pub fn new(
        decisions: Arc<dyn DecisionProvider>,
        market: Arc<dyn MarketDataProvider>,
        portfolio: Arc<dyn PortfolioProvider>,
    ) -> Self {
        Self {
            decisions,
            market,
            portfolio,
            memory: Arc::new(EmptyMemory),
            learning: Arc::new(NoopLearning),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_learning(mut self, learning: Arc<dyn LearningHook>) -> Self {
        self.learning = learning;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    pub armed: u64,
    /// Timers cancelled while running. Cancelling with no timer is not counted.
    pub cancelled: u64,
    /// Ticks dropped because the previous cycle was still in flight.
    pub skipped_ticks: u64,
}

/// Read-only view of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub agent: Agent,
    pub timer: TimerStats,
    pub timer_active: bool,
    pub cycle_in_flight: bool,
}

#[derive(Debug, Default)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, SchedulerError)>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Timer {
    generation: u64,
    token: CancellationToken,
}

struct AgentState {
    agent: Agent,
    timer: Option<Timer>,
    /// Bumped every time a timer is armed; cycles from older timers never trade.
    generation: u64,
    stats: TimerStats,
    /// Failed cycles recorded before the last start from `Stopped` or `Error`.
    error_baseline: u64,
    history: VecDeque<DecisionCycleRecord>,
    last_market: Option<MarketSnapshot>,
    last_portfolio: Option<PortfolioSnapshot>,
    last_memory: Option<MemorySnapshot>,
}

impl AgentState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
            self.stats.cancelled += 1;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.agent.status == AgentStatus::Active
            && self.timer.as_ref().map(|t| t.generation) == Some(generation)
    }

    fn errors_since_start(&self) -> u64 {
        self.agent
            .performance
            .error_count()
            .saturating_sub(self.error_baseline)
    }
}

struct AgentSlot {
    state: Mutex<AgentState>,
    /// Held for the whole of a cycle.
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    /// Serializes lifecycle operations on this agent.
    lifecycle: tokio::sync::Mutex<()>,
}

impl AgentSlot {
    fn new(agent: Agent) -> Self {
        Self {
            state: Mutex::new(AgentState {
                agent,
                timer: None,
                generation: 0,
                stats: TimerStats::default(),
                error_baseline: 0,
                history: VecDeque::new(),
                last_market: None,
                last_portfolio: None,
                last_memory: None,
            }),
            cycle_gate: Arc::new(tokio::sync::Mutex::new(())),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn view(&self) -> AgentView {
        let cycle_in_flight = self.cycle_gate.try_lock().is_err();
        let state = self.lock();
        AgentView {
            agent: state.agent.clone(),
            timer: state.stats,
            timer_active: state.timer.is_some(),
            cycle_in_flight,
        }
    }
}

struct Inner {
    config: SchedulerConfig,
    gateway: Arc<ToolGateway>,
    providers: Providers,
    store: Arc<dyn Persistence>,
    validator: DecisionValidator,
    agents: RwLock<HashMap<String, Arc<AgentSlot>>>,
}

/// Runs every registered agent on its own timer and drives its lifecycle.
///
/// Cloning is cheap and shares the same agents.
#[derive(Clone)]
pub struct AgentScheduler {
    inner: Arc<Inner>,
}

impl AgentScheduler {
    pub fn new(
        config: SchedulerConfig,
        gateway: Arc<ToolGateway>,
        providers: Providers,
        store: Arc<dyn Persistence>,
    ) -> Self {
        let validator = DecisionValidator::new(ValidationPolicy {
            min_confidence: config.min_confidence,
        });
        Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                providers,
                store,
                validator,
                agents: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn gateway(&self) -> &Arc<ToolGateway> {
        &self.inner.gateway
    }

    fn events(&self) -> &EventBus {
        self.inner.gateway.events()
    }

    fn read_agents(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<AgentSlot>>> {
        match self.inner.agents.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_agents(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<AgentSlot>>> {
        match self.inner.agents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn slot(&self, agent_id: &str) -> Option<Arc<AgentSlot>> {
        self.read_agents().get(agent_id).cloned()
    }

    fn require(&self, agent_id: &str) -> Result<Arc<AgentSlot>, SchedulerError> {
        self.slot(agent_id)
            .ok_or_else(|| SchedulerError::UnknownAgent(agent_id.to_string()))
    }

    fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_agents().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Add an agent in the `Stopped` state.
    pub async fn register_agent(&self, mut agent: Agent) -> Result<(), SchedulerError> {
        agent.status = AgentStatus::Stopped;
        let record = AgentStatusRecord::from(&agent);
        {
            let mut agents = self.write_agents();
            if agents.contains_key(&agent.id) {
                return Err(SchedulerError::DuplicateAgent(agent.id));
            }
            agents.insert(agent.id.clone(), Arc::new(AgentSlot::new(agent)));
        }
        info!(agent_id = %record.agent_id, "Agent registered");
        self.persist_status(&record).await;
        Ok(())
    }

    /// Stop the agent and forget it entirely.
    pub async fn remove_agent(&self, agent_id: &str) -> Result<Agent, SchedulerError> {
        let slot = self.require(agent_id)?;
        let _op = slot.lifecycle.lock().await;
        self.apply(&slot, agent_id, LifecycleAction::Stop).await?;
        self.write_agents().remove(agent_id);
        self.inner.gateway.forget_agent(agent_id);
        let agent = slot.lock().agent.clone();
        info!(agent_id, "Agent removed");
        Ok(agent)
    }

    pub async fn start(&self, agent_id: &str) -> Result<AgentStatus, SchedulerError> {
        self.transition(agent_id, LifecycleAction::Start).await
    }

    pub async fn pause(&self, agent_id: &str) -> Result<AgentStatus, SchedulerError> {
        self.transition(agent_id, LifecycleAction::Pause).await
    }

    pub async fn stop(&self, agent_id: &str) -> Result<AgentStatus, SchedulerError> {
        self.transition(agent_id, LifecycleAction::Stop).await
    }

    pub async fn start_all(&self) -> BulkReport {
        self.bulk(LifecycleAction::Start).await
    }

    pub async fn stop_all(&self) -> BulkReport {
        self.bulk(LifecycleAction::Stop).await
    }

    /// Stop every agent. Agents stay registered.
    pub async fn shutdown(&self) -> BulkReport {
        info!(agents = self.read_agents().len(), "Scheduler shutting down");
        self.stop_all().await
    }

    /// Replace the agent's configuration. Permissions are swapped wholesale and
    /// an active agent's timer is re-armed at the new interval.
    pub async fn update_config(
        &self,
        agent_id: &str,
        config: AgentConfig,
    ) -> Result<(), SchedulerError> {
        let slot = self.require(agent_id)?;
        let _op = slot.lifecycle.lock().await;

        let status = slot.lock().agent.status;
        if matches!(status, AgentStatus::Active | AgentStatus::Paused) {
            self.inner
                .gateway
                .configure_permissions(agent_id, &config.permissions)
                .await?;
        }

        let record = {
            let mut state = slot.lock();
            state.agent.config = config;
            if status == AgentStatus::Active {
                state.cancel_timer();
                self.arm_timer(agent_id, &mut state);
            }
            AgentStatusRecord::from(&state.agent)
        };
        info!(agent_id, status = %status, "Agent config updated");
        self.persist_status(&record).await;
        Ok(())
    }

    /// Run one cycle now, outside the timer. Refused unless the agent is
    /// `Active` with no cycle in flight.
    pub async fn run_cycle(&self, agent_id: &str) -> Result<DecisionCycleRecord, SchedulerError> {
        let slot = self.require(agent_id)?;
        let current = {
            let state = slot.lock();
            match (&state.timer, state.agent.status) {
                (Some(timer), AgentStatus::Active) => Ok((timer.generation, timer.token.clone())),
                (_, status) => Err(status),
            }
        };
        let (generation, token) = current.map_err(|status| SchedulerError::NotActive {
            agent_id: agent_id.to_string(),
            status,
        })?;
        let _gate = slot
            .cycle_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| SchedulerError::CycleInFlight(agent_id.to_string()))?;

        Ok(self.run_cycle_locked(&slot, agent_id, generation, token).await)
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentView> {
        self.slot(agent_id).map(|slot| slot.view())
    }

    /// All agents, ordered by id.
    pub fn agents(&self) -> Vec<AgentView> {
        let mut views: Vec<AgentView> = self.read_agents().values().map(|s| s.view()).collect();
        views.sort_by(|a, b| a.agent.id.cmp(&b.agent.id));
        views
    }

    /// Most recent cycle records, newest first.
    pub fn cycle_history(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<DecisionCycleRecord>, SchedulerError> {
        let slot = self.require(agent_id)?;
        let state = slot.lock();
        Ok(state.history.iter().rev().take(limit).cloned().collect())
    }

    async fn transition(
        &self,
        agent_id: &str,
        action: LifecycleAction,
    ) -> Result<AgentStatus, SchedulerError> {
        let slot = self.require(agent_id)?;
        let _op = slot.lifecycle.lock().await;
        self.apply(&slot, agent_id, action).await
    }

    async fn bulk(&self, action: LifecycleAction) -> BulkReport {
        let mut report = BulkReport::default();
        for agent_id in self.agent_ids() {
            match self.transition(&agent_id, action).await {
                Ok(_) => report.succeeded.push(agent_id),
                Err(e) => {
                    warn!(agent_id = %agent_id, action = %action, error = %e, "Bulk lifecycle step failed");
                    report.failed.push((agent_id, e));
                }
            }
        }
        info!(
            action = %action,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk lifecycle operation finished"
        );
        report
    }

    /// Carry out one lifecycle action. Caller holds the agent's lifecycle lock.
    async fn apply(
        &self,
        slot: &AgentSlot,
        agent_id: &str,
        action: LifecycleAction,
    ) -> Result<AgentStatus, SchedulerError> {
        let (from, profile) = {
            let state = slot.lock();
            (state.agent.status, state.agent.config.permissions.clone())
        };
        let step = lifecycle::transition(from, action).map_err(|invalid| {
            SchedulerError::InvalidTransition {
                agent_id: agent_id.to_string(),
                from: invalid.from,
                action: invalid.action,
            }
        })?;
        if step.is_noop() {
            debug!(agent_id, action = %action, status = %from, "Lifecycle no-op");
            return Ok(from);
        }

        if step.activate {
            self.inner.gateway.activate_agent(agent_id, &profile).await;
        }

        let (record, error_count) = {
            let mut state = slot.lock();
            if step.cancel_timer {
                state.cancel_timer();
            }
            if step.activate {
                state.error_baseline = state.agent.performance.error_count();
            }
            state.agent.status = step.to;
            if step.arm_timer {
                self.arm_timer(agent_id, &mut state);
            }
            (
                AgentStatusRecord::from(&state.agent),
                state.agent.performance.error_count(),
            )
        };

        if let Some(session_status) = step.deactivate {
            self.inner
                .gateway
                .deactivate_agent(agent_id, session_status)
                .await;
        }

        if action == LifecycleAction::Fault {
            error!(agent_id, error_count, "Agent faulted after too many failed cycles");
            self.events().emit(CoreEvent::AgentErrored {
                agent_id: agent_id.to_string(),
                error_count,
            });
        } else {
            info!(agent_id, from = %from, to = %step.to, action = %action, "Agent lifecycle transition");
        }
        self.persist_status(&record).await;
        Ok(step.to)
    }

    fn arm_timer(&self, agent_id: &str, state: &mut AgentState) {
        let period = Duration::from_millis(
            self.inner
                .config
                .effective_interval_ms(state.agent.config.decision_interval_ms),
        );
        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();

        tokio::spawn(timer_loop(
            Arc::downgrade(&self.inner),
            agent_id.to_string(),
            generation,
            period,
            token.clone(),
        ));
        state.timer = Some(Timer { generation, token });
        state.stats.armed += 1;
        debug!(agent_id, generation, period_ms = period.as_millis() as u64, "Timer armed");
    }

    fn spawn_tick(&self, agent_id: &str, generation: u64, token: CancellationToken) {
        let scheduler = self.clone();
        let id = agent_id.to_string();
        let cycle = tokio::spawn(async move { scheduler.tick(&id, generation, token).await });

        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = cycle.await {
                if e.is_panic() {
                    error!(agent_id = %agent_id, "Decision cycle panicked");
                }
            }
        });
    }

    async fn tick(&self, agent_id: &str, generation: u64, token: CancellationToken) {
        let Some(slot) = self.slot(agent_id) else {
            return;
        };
        let current = slot.lock().is_current(generation);
        if !current {
            return;
        }

        let Ok(_gate) = slot.cycle_gate.clone().try_lock_owned() else {
            slot.lock().stats.skipped_ticks += 1;
            warn!(agent_id, "Previous cycle still running, skipping tick");
            self.events().emit(CoreEvent::CycleSkipped {
                agent_id: agent_id.to_string(),
            });
            return;
        };

        self.run_cycle_locked(&slot, agent_id, generation, token)
            .await;
    }

    /// Run and record one cycle. Caller holds the cycle gate.
    async fn run_cycle_locked(
        &self,
        slot: &AgentSlot,
        agent_id: &str,
        generation: u64,
        token: CancellationToken,
    ) -> DecisionCycleRecord {
        let agent = slot.lock().agent.clone();
        let mut draft = CycleDraft::new(agent_id);
        debug!(agent_id, cycle_id = %draft.cycle_id, "Cycle started");

        let outcome = self
            .cycle_steps(slot, &agent, generation, &token, &mut draft)
            .await;
        let realized_pnl = draft.realized_pnl;
        let record = draft.finish(outcome);

        self.record_cycle(slot, agent_id, &record, realized_pnl)
            .await;
        record
    }

    async fn cycle_steps(
        &self,
        slot: &AgentSlot,
        agent: &Agent,
        generation: u64,
        token: &CancellationToken,
        draft: &mut CycleDraft,
    ) -> CycleOutcome {
        let cycle_id = draft.cycle_id;

        let snapshots = self.gather_snapshots(slot, agent).await;
        draft.inputs = Some(snapshots.reference());
        let request = DecisionRequest {
            request_id: Uuid::new_v4(),
            cycle_id,
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            config: agent.config.clone(),
            strategy: agent.config.strategy.clone(),
            market: snapshots.market,
            portfolio: snapshots.portfolio,
            memory: snapshots.memory,
            requested_at: Utc::now(),
        };

        let decision = match self.request_decision(&request, token).await {
            DecisionCall::Decided(decision) => decision,
            DecisionCall::Cancelled => {
                info!(agent_id = %agent.id, %cycle_id, "Decision call cancelled");
                return CycleOutcome::Cancelled;
            }
            DecisionCall::Failed(e) => {
                warn!(agent_id = %agent.id, %cycle_id, error = %e, "Decision provider failed");
                draft.error = Some(e.to_string());
                return CycleOutcome::Failed;
            }
        };
        draft.decision = Some(decision.clone());

        let validation = self.inner.validator.validate(
            &decision,
            &agent.config,
            &request.market,
            &request.portfolio,
        );
        draft.validation = validation.clone();
        if let ValidationOutcome::Rejected { reasons } = validation {
            warn!(agent_id = %agent.id, %cycle_id, reasons = ?reasons, "Decision rejected");
            self.events().emit(CoreEvent::DecisionRejected {
                agent_id: agent.id.clone(),
                cycle_id,
                reasons,
            });
            return CycleOutcome::Rejected;
        }

        let Some(order) = OrderIntent::from_decision(&decision, &request.market, &request.portfolio)
        else {
            debug!(agent_id = %agent.id, %cycle_id, action = ?decision.action, "Nothing to execute");
            return CycleOutcome::NoAction;
        };

        let still_current = slot.lock().is_current(generation);
        if !still_current || token.is_cancelled() {
            info!(agent_id = %agent.id, %cycle_id, "Agent left active state, order suppressed");
            draft.execution = ExecutionOutcome::Suppressed;
            return CycleOutcome::Suppressed;
        }

        let tool_id = self.inner.config.execution_tool.clone();
        let params = order.parameters(&self.inner.config.order_strategy);
        match self
            .inner
            .gateway
            .execute(&agent.id, &tool_id, params, CallContext::for_cycle(cycle_id))
            .await
        {
            Ok(outcome) => {
                info!(
                    agent_id = %agent.id,
                    %cycle_id,
                    symbol = %order.symbol,
                    side = order.side,
                    quantity = %order.quantity,
                    "Order executed"
                );
                draft.realized_pnl = realized_pnl(&outcome.result);
                draft.execution = ExecutionOutcome::Executed {
                    call_id: outcome.call_id,
                    tool_id,
                    result: outcome.result,
                };
                CycleOutcome::Executed
            }
            Err(e) => {
                warn!(agent_id = %agent.id, %cycle_id, tool_id = %tool_id, error = %e, "Order execution failed");
                draft.error = Some(e.to_string());
                draft.execution = ExecutionOutcome::Failed {
                    tool_id,
                    error: e.to_string(),
                };
                CycleOutcome::Failed
            }
        }
    }

    async fn request_decision(
        &self,
        request: &DecisionRequest,
        token: &CancellationToken,
    ) -> DecisionCall {
        let timeout_ms = self.inner.config.decision_timeout_ms;
        let call = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.inner.providers.decisions.make_decision(request),
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => DecisionCall::Cancelled,
            result = call => match result {
                Ok(Ok(decision)) => DecisionCall::Decided(decision),
                Ok(Err(e)) => DecisionCall::Failed(e),
                Err(_) => DecisionCall::Failed(AgentError::Timeout(timeout_ms)),
            },
        }
    }

    async fn gather_snapshots(&self, slot: &AgentSlot, agent: &Agent) -> Snapshots {
        let limit = Duration::from_millis(self.inner.config.snapshot_timeout_ms);
        let providers = &self.inner.providers;
        let (market, portfolio, memory) = tokio::join!(
            fetch(limit, providers.market.market_snapshot(&agent.config.allowed_symbols)),
            fetch(limit, providers.portfolio.portfolio_snapshot(&agent.id)),
            fetch(limit, providers.memory.memory_snapshot(&agent.id)),
        );

        let mut degraded = Vec::new();
        let mut guard = slot.lock();
        let state = &mut *guard;
        Snapshots {
            market: settle(&agent.id, "market", market, &mut state.last_market, &mut degraded),
            portfolio: settle(
                &agent.id,
                "portfolio",
                portfolio,
                &mut state.last_portfolio,
                &mut degraded,
            ),
            memory: settle(&agent.id, "memory", memory, &mut state.last_memory, &mut degraded),
            degraded,
        }
    }

    async fn record_cycle(
        &self,
        slot: &AgentSlot,
        agent_id: &str,
        record: &DecisionCycleRecord,
        realized_pnl: Option<Decimal>,
    ) {
        let max_errors = self.inner.config.max_cycle_errors;
        let history_limit = self.inner.config.cycle_history_limit.max(1);

        let (agent, over_ceiling) = {
            let mut state = slot.lock();
            let performance = &mut state.agent.performance;
            if let Some(success) = record.outcome.counts_as_success() {
                performance.record_cycle(success);
            }
            if record.outcome == CycleOutcome::Executed {
                performance.record_trade(realized_pnl);
            }
            state.agent.last_cycle_at = Some(record.finished_at);
            state.history.push_back(record.clone());
            while state.history.len() > history_limit {
                state.history.pop_front();
            }
            let over_ceiling =
                record.outcome == CycleOutcome::Failed && state.errors_since_start() > max_errors;
            (state.agent.clone(), over_ceiling)
        };

        debug!(
            agent_id,
            cycle_id = %record.cycle_id,
            outcome = ?record.outcome,
            latency_ms = record.latency_ms,
            "Cycle completed"
        );
        if let Err(e) = self.inner.store.save_cycle_record(record).await {
            warn!(agent_id, cycle_id = %record.cycle_id, error = %e, "Failed to persist cycle record");
        }
        self.persist_status(&AgentStatusRecord::from(&agent)).await;
        self.inner
            .providers
            .learning
            .process_outcome(&agent, record)
            .await;
        self.events().emit(CoreEvent::CycleCompleted {
            agent_id: agent_id.to_string(),
            cycle_id: record.cycle_id,
            outcome: record.outcome,
            latency_ms: record.latency_ms,
        });

        if over_ceiling {
            self.fault(slot, agent_id, max_errors).await;
        }
    }

    async fn fault(&self, slot: &AgentSlot, agent_id: &str, max_errors: u64) {
        let _op = slot.lifecycle.lock().await;
        // A start or stop may have won the race for the lifecycle lock.
        let still_over = {
            let state = slot.lock();
            matches!(state.agent.status, AgentStatus::Active | AgentStatus::Paused)
                && state.errors_since_start() > max_errors
        };
        if !still_over {
            return;
        }
        if let Err(e) = self.apply(slot, agent_id, LifecycleAction::Fault).await {
            debug!(agent_id, error = %e, "Fault not applied");
        }
    }

    async fn persist_status(&self, record: &AgentStatusRecord) {
        if let Err(e) = self.inner.store.save_agent_status(record).await {
            warn!(agent_id = %record.agent_id, error = %e, "Failed to persist agent status");
        }
    }
}

async fn timer_loop(
    inner: Weak<Inner>,
    agent_id: String,
    generation: u64,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let scheduler = AgentScheduler { inner };
                scheduler.spawn_tick(&agent_id, generation, token.clone());
            }
        }
    }
    debug!(agent_id = %agent_id, generation, "Timer stopped");
}

enum DecisionCall {
    Decided(Decision),
    Cancelled,
    Failed(AgentError),
}

struct CycleDraft {
    cycle_id: Uuid,
    agent_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    inputs: Option<SnapshotRef>,
    decision: Option<Decision>,
    validation: ValidationOutcome,
    execution: ExecutionOutcome,
    error: Option<String>,
    realized_pnl: Option<Decimal>,
}

impl CycleDraft {
    fn new(agent_id: &str) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
            inputs: None,
            decision: None,
            validation: ValidationOutcome::Skipped,
            execution: ExecutionOutcome::NotAttempted,
            error: None,
            realized_pnl: None,
        }
    }

    fn finish(self, outcome: CycleOutcome) -> DecisionCycleRecord {
        DecisionCycleRecord {
            cycle_id: self.cycle_id,
            agent_id: self.agent_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            inputs: self.inputs,
            decision: self.decision,
            validation: self.validation,
            execution: self.execution,
            outcome,
            error: self.error,
            latency_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}

struct Snapshots {
    market: MarketSnapshot,
    portfolio: PortfolioSnapshot,
    memory: MemorySnapshot,
    degraded: Vec<String>,
}

impl Snapshots {
    fn reference(&self) -> SnapshotRef {
        SnapshotRef {
            market_captured_at: self.market.captured_at,
            portfolio_captured_at: self.portfolio.captured_at,
            degraded_sources: self.degraded.clone(),
        }
    }
}

/// Snapshot types with a cached and a default stand-in.
trait Snapshot: Clone {
    fn is_degraded(&self) -> bool;
    fn into_degraded(self) -> Self;
    fn fallback() -> Self;
}

impl Snapshot for MarketSnapshot {
    fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    fn fallback() -> Self {
        MarketSnapshot::empty_degraded()
    }
}

impl Snapshot for PortfolioSnapshot {
    fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    fn fallback() -> Self {
        PortfolioSnapshot::empty_degraded()
    }
}

impl Snapshot for MemorySnapshot {
    fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn into_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    fn fallback() -> Self {
        MemorySnapshot {
            entries: Vec::new(),
            degraded: true,
        }
    }
}

async fn fetch<T>(
    limit: Duration,
    snapshot: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::time::timeout(limit, snapshot)
        .await
        .unwrap_or_else(|_| Err(AgentError::Timeout(limit.as_millis() as u64)))
}

fn settle<T: Snapshot>(
    agent_id: &str,
    source: &str,
    fetched: Result<T, AgentError>,
    last_good: &mut Option<T>,
    degraded: &mut Vec<String>,
) -> T {
    match fetched {
        Ok(snapshot) if !snapshot.is_degraded() => {
            *last_good = Some(snapshot.clone());
            snapshot
        }
        Ok(snapshot) => {
            warn!(agent_id, source, "Provider returned a degraded snapshot");
            degraded.push(source.to_string());
            snapshot
        }
        Err(e) => {
            degraded.push(source.to_string());
            match last_good {
                Some(cached) => {
                    warn!(agent_id, source, error = %e, "Snapshot failed, using last good");
                    cached.clone().into_degraded()
                }
                None => {
                    warn!(agent_id, source, error = %e, "Snapshot failed, using default");
                    T::fallback()
                }
            }
        }
    }
}

/// What an approved decision asks the execution tool to do.
struct OrderIntent {
    symbol: String,
    side: &'static str,
    quantity: Decimal,
    price: Option<Decimal>,
}

impl OrderIntent {
    /// None when the decision needs no order: hold, or close with nothing held.
    fn from_decision(
        decision: &Decision,
        market: &MarketSnapshot,
        portfolio: &PortfolioSnapshot,
    ) -> Option<Self> {
        let action = decision.action?;
        if action == TradeAction::Hold {
            return None;
        }
        let symbol = decision.symbol.as_deref()?.trim().to_string();
        let (side, quantity) = match action {
            TradeAction::Buy => ("buy", decision.quantity?),
            TradeAction::Sell => ("sell", decision.quantity?),
            TradeAction::Close => {
                let held = portfolio.position_quantity(&symbol);
                if held.is_zero() {
                    return None;
                }
                if held > Decimal::ZERO {
                    ("sell", held)
                } else {
                    ("buy", -held)
                }
            }
            TradeAction::Hold => return None,
        };
        Some(Self {
            symbol,
            side,
            quantity,
            price: resolve_price(decision, market),
        })
    }

    fn parameters(&self, strategy: &str) -> Value {
        let mut params = json!({
            "symbol": self.symbol,
            "side": self.side,
            "quantity": self.quantity.to_f64(),
            "strategy": strategy,
        });
        if let Some(price) = self.price.and_then(|p| p.to_f64()) {
            params["price"] = json!(price);
        }
        params
    }
}

/// `realized_pnl` reported by the execution tool, as a string or a number.
fn realized_pnl(result: &Value) -> Option<Decimal> {
    match result.get("realized_pnl")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};
use tradeloop_models::{
    AuditPolicy, CallError, CallRecord, CoreEvent, GatewayConfig, PermissionProfile,
    PermissionSet, Session, SessionStatus, ToolDefinition, ToolUsage,
};
use tradeloop_store::Persistence;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::clock::{Clock, SystemClock};
use crate::error::{GatewayError, RegistryError};
use crate::events::EventBus;
use crate::permissions::{check_access, PermissionStore};
use crate::rate_limit::RateLimiter;
use crate::registry::ToolRegistry;
use crate::session::SessionManager;
use crate::tool::{CallContext, ToolContext, ToolImplementation};
use crate::validation::validate_parameters;

/// Successful gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: Uuid,
    pub tool_id: String,
    pub result: Value,
    pub duration_ms: u64,
}

/// Capability-restricted entry point for every tool invocation.
///
/// Each call runs the full pipeline (registration, session, availability,
/// authorization, rate limit, schema, dispatch) and always leaves exactly one
/// call record behind. Calls for the same agent are serialized.
pub struct ToolGateway {
    config: GatewayConfig,
    registry: Arc<ToolRegistry>,
    permissions: PermissionStore,
    limiter: RateLimiter,
    sessions: SessionManager,
    audit: AuditLog,
    events: EventBus,
    store: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    agent_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ToolGateway {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<ToolRegistry>,
        events: EventBus,
        store: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            permissions: PermissionStore::new(),
            limiter: RateLimiter::new(),
            sessions: SessionManager::new(config.session_history_limit),
            audit: AuditLog::new(config.audit_capacity),
            config,
            registry,
            events,
            store,
            clock: Arc::new(SystemClock),
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall clock used for call timestamps and rate windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn agent_lock(&self, agent_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.agent_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(agent_id.to_string()).or_default().clone()
    }

    pub fn register_tool(
        &self,
        definition: ToolDefinition,
        implementation: Arc<dyn ToolImplementation>,
    ) -> Result<(), RegistryError> {
        self.registry.register(definition, implementation)
    }

    pub fn unregister_tool(&self, tool_id: &str) -> Result<ToolDefinition, RegistryError> {
        self.registry.unregister(tool_id, &self.permissions)
    }

    pub fn tool_usage(&self, tool_id: &str) -> Option<ToolUsage> {
        self.registry.usage(tool_id)
    }

    /// Install the agent's permission set and open its session, together.
    ///
    /// An already active session is kept; the permission set is replaced.
    pub async fn activate_agent(&self, agent_id: &str, profile: &PermissionProfile) -> Session {
        let lock = self.agent_lock(agent_id);
        let _serial = lock.lock().await;

        self.permissions
            .install(PermissionSet::derive(agent_id, profile));
        let (session, created) = self.sessions.open(agent_id);

        if created {
            info!(agent_id, session_id = %session.id, "Agent activated");
            self.persist_session(&session).await;
            self.events.emit(CoreEvent::AgentActivated {
                agent_id: agent_id.to_string(),
                session_id: session.id,
            });
        }
        session
    }

    /// Remove the permission set and close the session with `status`, together.
    pub async fn deactivate_agent(&self, agent_id: &str, status: SessionStatus) -> Option<Session> {
        let lock = self.agent_lock(agent_id);
        let _serial = lock.lock().await;

        let removed = self.permissions.remove(agent_id);
        let closed = self.sessions.close(agent_id, status);

        if let Some(session) = &closed {
            self.persist_session(session).await;
        }
        if removed.is_some() || closed.is_some() {
            info!(
                agent_id,
                session_id = ?closed.as_ref().map(|s| s.id),
                status = ?status,
                "Agent deactivated"
            );
            self.events.emit(CoreEvent::AgentDeactivated {
                agent_id: agent_id.to_string(),
                session_id: closed.as_ref().map(|s| s.id),
            });
        }
        closed
    }

    /// Replace an active agent's permission set wholesale.
    pub async fn configure_permissions(
        &self,
        agent_id: &str,
        profile: &PermissionProfile,
    ) -> Result<Arc<PermissionSet>, GatewayError> {
        let lock = self.agent_lock(agent_id);
        let _serial = lock.lock().await;

        if !self.permissions.contains(agent_id) {
            return Err(GatewayError::NotRegistered {
                agent_id: agent_id.to_string(),
            });
        }
        self.permissions
            .install(PermissionSet::derive(agent_id, profile));
        info!(agent_id, "Permission set replaced");
        self.permissions
            .get(agent_id)
            .ok_or_else(|| GatewayError::NotRegistered {
                agent_id: agent_id.to_string(),
            })
    }

    pub fn permission_set(&self, agent_id: &str) -> Option<Arc<PermissionSet>> {
        self.permissions.get(agent_id)
    }

    pub fn active_session(&self, agent_id: &str) -> Option<Session> {
        self.sessions.active(agent_id)
    }

    /// Drop rate-limit windows and the call lock for an agent that no longer exists.
    pub fn forget_agent(&self, agent_id: &str) {
        self.limiter.forget(agent_id);
        if let Ok(mut locks) = self.agent_locks.lock() {
            locks.remove(agent_id);
        }
    }

    /// Call records from the in-memory ledger, newest first.
    pub fn call_records(&self, agent_id: Option<&str>, limit: usize) -> Vec<CallRecord> {
        match agent_id {
            Some(agent_id) => self.audit.for_agent(agent_id, limit),
            None => self.audit.recent(limit),
        }
    }

    pub async fn execute(
        &self,
        agent_id: &str,
        tool_id: &str,
        parameters: Value,
        ctx: CallContext,
    ) -> Result<ToolOutcome, GatewayError> {
        let lock = self.agent_lock(agent_id);
        let _serial = lock.lock().await;

        let call_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let timer = Instant::now();

        let set = self.permissions.get(agent_id);
        let session_id = self.sessions.active_id(agent_id);
        let result = self
            .run_pipeline(
                agent_id,
                tool_id,
                &parameters,
                &ctx,
                call_id,
                set.as_deref(),
                session_id,
            )
            .await;

        let elapsed = timer.elapsed();
        let finished_at = self.clock.now();
        let duration_ms = elapsed.as_millis() as u64;
        let success = result.is_ok();

        if let Some(tool) = self.registry.get(tool_id) {
            tool.record_usage(success, elapsed.as_secs_f64() * 1000.0, finished_at);
        }

        match &result {
            Ok(_) => debug!(agent_id, tool_id, %call_id, duration_ms, "Tool call succeeded"),
            Err(e) => warn!(
                agent_id,
                tool_id,
                %call_id,
                kind = e.kind().as_str(),
                error = %e,
                "Tool call failed"
            ),
        }

        let policy: AuditPolicy = set.as_ref().map(|s| s.audit).unwrap_or_default();
        let record = CallRecord {
            id: call_id,
            agent_id: agent_id.to_string(),
            tool_id: tool_id.to_string(),
            session_id,
            parameters,
            result: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| CallError {
                kind: e.kind(),
                message: e.to_string(),
            }),
            success,
            started_at,
            finished_at,
            duration_ms,
        }
        .redacted(policy.verbosity);

        if policy.enabled {
            if let Err(e) = self.store.save_call_record(&record).await {
                warn!(agent_id, %call_id, error = %e, "Failed to persist call record");
            }
        }
        self.audit.append(record);
        self.sessions.record_call(agent_id, tool_id, success);
        self.events.emit(CoreEvent::ToolCallCompleted {
            agent_id: agent_id.to_string(),
            tool_id: tool_id.to_string(),
            call_id,
            success,
        });

        result.map(|value| ToolOutcome {
            call_id,
            tool_id: tool_id.to_string(),
            result: value,
            duration_ms,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        agent_id: &str,
        tool_id: &str,
        parameters: &Value,
        ctx: &CallContext,
        call_id: Uuid,
        set: Option<&PermissionSet>,
        session_id: Option<Uuid>,
    ) -> Result<Value, GatewayError> {
        let set = set.ok_or_else(|| GatewayError::NotRegistered {
            agent_id: agent_id.to_string(),
        })?;
        // Session is required before the tool is even looked up.
        let session_id = session_id.ok_or_else(|| GatewayError::NoActiveSession {
            agent_id: agent_id.to_string(),
        })?;

        let tool = self
            .registry
            .get(tool_id)
            .filter(|t| t.is_enabled())
            .ok_or_else(|| GatewayError::ToolUnavailable {
                tool_id: tool_id.to_string(),
            })?;
        let definition = tool.definition();

        check_access(set, &definition)?;

        let now_ms = self.clock.now().timestamp_millis().max(0) as u64;
        self.limiter
            .check_and_record_at(agent_id, tool_id, &set.quota, now_ms)
            .map_err(|t| GatewayError::RateLimited {
                scope: t.scope,
                retry_after_ms: t.retry_after_ms,
            })?;

        let params = validate_parameters(&definition, parameters).map_err(|violations| {
            GatewayError::InvalidParameters {
                tool_id: tool_id.to_string(),
                violations,
            }
        })?;

        let tool_ctx = ToolContext {
            agent_id: agent_id.to_string(),
            session_id,
            call_id,
            cycle_id: ctx.cycle_id,
        };
        let implementation = tool.implementation();
        let timeout_ms = self.config.dispatch_timeout_ms;

        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            implementation.execute(&params, &tool_ctx),
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(GatewayError::ExecutionFailed {
                tool_id: tool_id.to_string(),
                message: failure.0,
            }),
            Err(_) => Err(GatewayError::Timeout {
                tool_id: tool_id.to_string(),
                timeout_ms,
            }),
        }
    }

    async fn persist_session(&self, session: &Session) {
        if let Err(e) = self.store.save_session(session).await {
            warn!(agent_id = %session.agent_id, session_id = %session.id, error = %e, "Failed to persist session");
        }
    }
}

//! End-to-end checks of the tool execution pipeline: each short-circuit
//! produces the right error, never reaches the tool when it should not, and
//! always leaves exactly one call record and one usage tick behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tradeloop_gateway::test_support::{mock_definition, ManualClock, MockTool};
use tradeloop_gateway::{
    CallContext, Clock, EventBus, GatewayError, RateScope, SystemClock, ToolGateway, ToolRegistry,
};
use tradeloop_models::catalog::{default_tools, EXECUTE_SMART_ORDER};
use tradeloop_models::{
    AuditPolicy, AuditVerbosity, CallErrorKind, CallRecord, Capability, CoreEvent, GatewayConfig,
    PermissionProfile, Quota, SessionStatus, ToolCategory,
};
use tradeloop_store::MemoryStore;

struct Harness {
    gateway: Arc<ToolGateway>,
    store: Arc<MemoryStore>,
    quote: Arc<MockTool>,
}

fn harness_with(config: GatewayConfig, quote: MockTool) -> Harness {
    harness_on(config, quote, Arc::new(SystemClock))
}

fn harness_on(config: GatewayConfig, quote: MockTool, clock: Arc<dyn Clock>) -> Harness {
    let store = Arc::new(MemoryStore::new(10_000, Duration::from_secs(600)));
    let gateway = ToolGateway::new(
        config,
        Arc::new(ToolRegistry::new()),
        EventBus::new(256),
        store.clone(),
    )
    .with_clock(clock);
    let quote = quote.shared();
    gateway
        .register_tool(
            mock_definition("get_quote", ToolCategory::MarketAnalysis),
            quote.clone(),
        )
        .unwrap();
    Harness {
        gateway: Arc::new(gateway),
        store,
        quote,
    }
}

fn harness() -> Harness {
    harness_with(GatewayConfig::default(), MockTool::new())
}

fn trading_profile() -> PermissionProfile {
    PermissionProfile {
        capabilities: vec![Capability::Trading],
        ..Default::default()
    }
}

async fn call(h: &Harness, agent_id: &str, params: serde_json::Value) -> Result<(), GatewayError> {
    h.gateway
        .execute(agent_id, "get_quote", params, CallContext::default())
        .await
        .map(|_| ())
}

#[tokio::test]
async fn successful_call_applies_defaults_and_counts_everywhere() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let outcome = h
        .gateway
        .execute(
            "agent-1",
            "get_quote",
            json!({"symbol": "AAPL"}),
            CallContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.result, json!({"ok": true}));
    assert_eq!(h.quote.dispatch_count(), 1);
    assert_eq!(h.quote.last_params().unwrap().f64("size"), Some(1.0));

    let usage = h.gateway.tool_usage("get_quote").unwrap();
    assert_eq!(usage.total_calls, 1);
    assert_eq!(usage.successful_calls, 1);
    assert!(usage.last_used.is_some());

    let session = h.gateway.active_session("agent-1").unwrap();
    assert_eq!(session.total_calls, 1);
    assert!(session.tools_used.contains("get_quote"));

    let records = h.gateway.call_records(Some("agent-1"), 10);
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].session_id, Some(session.id));
}

#[tokio::test]
async fn schema_violations_never_dispatch() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let err = call(&h, "agent-1", json!({"size": 500, "venue": "dark"}))
        .await
        .unwrap_err();
    match err {
        GatewayError::InvalidParameters { violations, .. } => {
            assert_eq!(violations.len(), 3);
        }
        other => panic!("expected InvalidParameters, got {other:?}"),
    }
    assert_eq!(h.quote.dispatch_count(), 0);

    let usage = h.gateway.tool_usage("get_quote").unwrap();
    assert_eq!(usage.total_calls, 1);
    assert_eq!(usage.failed_calls, 1);

    let record = &h.gateway.call_records(Some("agent-1"), 1)[0];
    assert_eq!(
        record.error.as_ref().map(|e| e.kind),
        Some(CallErrorKind::InvalidParameters)
    );
}

#[tokio::test]
async fn permission_denied_for_blocked_and_ungranted_tools() {
    let h = harness();
    let smart_order = default_tools()
        .into_iter()
        .find(|t| t.id == EXECUTE_SMART_ORDER)
        .unwrap();
    let order_tool = MockTool::new().shared();
    h.gateway
        .register_tool(smart_order, order_tool.clone())
        .unwrap();

    h.gateway
        .activate_agent(
            "analyst",
            &PermissionProfile {
                capabilities: vec![Capability::Analysis],
                blocked_tools: vec!["get_quote".to_string()],
                ..Default::default()
            },
        )
        .await;

    let blocked = call(&h, "analyst", json!({"symbol": "AAPL"})).await;
    assert!(matches!(blocked, Err(GatewayError::PermissionDenied { .. })));

    let ungranted = h
        .gateway
        .execute(
            "analyst",
            EXECUTE_SMART_ORDER,
            json!({"symbol": "AAPL", "side": "buy", "quantity": 1}),
            CallContext::default(),
        )
        .await;
    assert!(matches!(ungranted, Err(GatewayError::PermissionDenied { .. })));

    assert_eq!(h.quote.dispatch_count(), 0);
    assert_eq!(order_tool.dispatch_count(), 0);
    assert_eq!(h.gateway.active_session("analyst").unwrap().failed_calls, 2);
}

#[tokio::test]
async fn call_beyond_quota_is_rate_limited() {
    let h = harness();
    h.gateway
        .activate_agent(
            "agent-1",
            &PermissionProfile {
                capabilities: vec![Capability::Trading],
                quota: Quota {
                    max_calls_per_minute: 0,
                    max_calls_per_day: 3,
                    max_calls_per_tool_per_minute: None,
                },
                ..Default::default()
            },
        )
        .await;

    for _ in 0..3 {
        call(&h, "agent-1", json!({"symbol": "AAPL"})).await.unwrap();
    }
    let err = call(&h, "agent-1", json!({"symbol": "AAPL"}))
        .await
        .unwrap_err();
    match err {
        GatewayError::RateLimited {
            scope,
            retry_after_ms,
        } => {
            assert_eq!(scope, RateScope::Day);
            assert!(retry_after_ms > 0);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(h.quote.dispatch_count(), 3);
}

#[tokio::test]
async fn per_minute_quota_reopens_after_the_window_rolls() {
    let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap());
    let h = harness_on(GatewayConfig::default(), MockTool::new(), clock.clone());
    h.gateway
        .activate_agent(
            "agent-1",
            &PermissionProfile {
                capabilities: vec![Capability::Trading],
                quota: Quota {
                    max_calls_per_minute: 2,
                    max_calls_per_day: 0,
                    max_calls_per_tool_per_minute: None,
                },
                ..Default::default()
            },
        )
        .await;

    for _ in 0..2 {
        call(&h, "agent-1", json!({"symbol": "AAPL"})).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
    }
    match call(&h, "agent-1", json!({"symbol": "AAPL"})).await {
        Err(GatewayError::RateLimited {
            scope,
            retry_after_ms,
        }) => {
            assert_eq!(scope, RateScope::Minute);
            assert_eq!(retry_after_ms, 50_000);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(h.quote.dispatch_count(), 2);

    clock.advance(chrono::Duration::seconds(50));
    call(&h, "agent-1", json!({"symbol": "AAPL"})).await.unwrap();
    assert_eq!(h.quote.dispatch_count(), 3);

    let records = h.gateway.call_records(Some("agent-1"), 10);
    assert_eq!(records.len(), 4);
    assert!(records
        .iter()
        .any(|r| r.started_at == Utc.with_ymd_and_hms(2026, 3, 2, 14, 31, 0).unwrap()));
}

#[tokio::test]
async fn unavailable_tools() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let missing = h
        .gateway
        .execute(
            "agent-1",
            "does_not_exist",
            json!({}),
            CallContext::default(),
        )
        .await;
    assert!(matches!(missing, Err(GatewayError::ToolUnavailable { .. })));
    assert!(h.gateway.tool_usage("does_not_exist").is_none());

    h.gateway.registry().set_enabled("get_quote", false).unwrap();
    let disabled = call(&h, "agent-1", json!({"symbol": "AAPL"})).await;
    assert!(matches!(disabled, Err(GatewayError::ToolUnavailable { .. })));
    assert_eq!(h.quote.dispatch_count(), 0);
    // The tool still exists, so the failed call is counted against it.
    assert_eq!(h.gateway.tool_usage("get_quote").unwrap().total_calls, 1);
    assert_eq!(h.gateway.audit().len(), 2);
}

#[tokio::test]
async fn no_active_session_is_refused_before_dispatch() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;
    h.gateway
        .sessions()
        .close("agent-1", SessionStatus::Timeout);

    let err = call(&h, "agent-1", json!({"symbol": "AAPL"}))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoActiveSession { .. }));
    assert_eq!(h.quote.dispatch_count(), 0);
    assert!(h.gateway.call_records(Some("agent-1"), 1)[0]
        .session_id
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out() {
    let h = harness_with(
        GatewayConfig {
            dispatch_timeout_ms: 50,
            ..Default::default()
        },
        MockTool::new().with_delay(Duration::from_secs(5)),
    );
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let err = call(&h, "agent-1", json!({"symbol": "AAPL"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Timeout {
            tool_id: "get_quote".to_string(),
            timeout_ms: 50
        }
    );
    assert!(err.is_transient());
    assert_eq!(h.quote.dispatch_count(), 1);
}

#[tokio::test]
async fn tool_errors_become_execution_failed() {
    let h = harness_with(GatewayConfig::default(), MockTool::failing("venue closed"));
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let err = call(&h, "agent-1", json!({"symbol": "AAPL"}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::ExecutionFailed {
            tool_id: "get_quote".to_string(),
            message: "venue closed".to_string()
        }
    );
    let usage = h.gateway.tool_usage("get_quote").unwrap();
    assert_eq!(usage.failed_calls, 1);
    assert_eq!(usage.success_rate, 0.0);
}

#[tokio::test]
async fn every_call_adds_one_record_and_one_usage_tick() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;

    let params = [
        json!({"symbol": "AAPL"}),
        json!({}),
        json!({"symbol": "MSFT", "size": 3}),
        json!("not an object"),
        json!({"symbol": "TSLA", "size": 0}),
    ];
    for (i, p) in params.into_iter().enumerate() {
        let _ = call(&h, "agent-1", p).await;
        assert_eq!(h.gateway.audit().len(), i + 1);
        assert_eq!(
            h.gateway.tool_usage("get_quote").unwrap().total_calls,
            (i + 1) as u64
        );
    }
    assert_eq!(h.quote.dispatch_count(), 2);
    assert_eq!(h.gateway.active_session("agent-1").unwrap().total_calls, 5);
}

#[tokio::test]
async fn audit_policy_shapes_and_gates_persistence() {
    let h = harness();
    h.gateway
        .activate_agent(
            "quiet",
            &PermissionProfile {
                capabilities: vec![Capability::Trading],
                audit: AuditPolicy {
                    enabled: false,
                    verbosity: AuditVerbosity::Minimal,
                    retention_days: 1,
                },
                ..Default::default()
            },
        )
        .await;
    h.gateway.activate_agent("loud", &trading_profile()).await;

    call(&h, "quiet", json!({"symbol": "AAPL"})).await.unwrap();
    call(&h, "loud", json!({"symbol": "AAPL"})).await.unwrap();

    let quiet = h.gateway.call_records(Some("quiet"), 1).remove(0);
    assert!(quiet.parameters.is_null());
    assert!(quiet.result.is_none());
    let persisted: Option<CallRecord> = h.store.get(&format!("call:{}", quiet.id)).await.unwrap();
    assert!(persisted.is_none());

    let loud = h.gateway.call_records(Some("loud"), 1).remove(0);
    assert_eq!(loud.parameters["symbol"], "AAPL");
    assert!(loud.result.is_none());
    let persisted: Option<CallRecord> = h.store.get(&format!("call:{}", loud.id)).await.unwrap();
    assert_eq!(persisted, Some(loud));
}

#[tokio::test(start_paused = true)]
async fn calls_are_serialized_per_agent_only() {
    let h = harness_with(
        GatewayConfig::default(),
        MockTool::new().with_delay(Duration::from_millis(100)),
    );
    h.gateway.activate_agent("a", &trading_profile()).await;
    h.gateway.activate_agent("b", &trading_profile()).await;

    let same_agent = tokio::join!(
        call(&h, "a", json!({"symbol": "AAPL"})),
        call(&h, "a", json!({"symbol": "MSFT"})),
    );
    assert!(same_agent.0.is_ok() && same_agent.1.is_ok());
    assert_eq!(h.quote.peak_in_flight(), 1);

    let different_agents = tokio::join!(
        call(&h, "a", json!({"symbol": "AAPL"})),
        call(&h, "b", json!({"symbol": "AAPL"})),
    );
    assert!(different_agents.0.is_ok() && different_agents.1.is_ok());
    assert_eq!(h.quote.peak_in_flight(), 2);
}

#[tokio::test]
async fn tool_call_events_are_emitted() {
    let h = harness();
    h.gateway.activate_agent("agent-1", &trading_profile()).await;
    let mut events = h.gateway.events().subscribe();

    let _ = call(&h, "agent-1", json!({})).await;

    match events.recv().await.unwrap() {
        CoreEvent::ToolCallCompleted {
            agent_id,
            tool_id,
            success,
            ..
        } => {
            assert_eq!(agent_id, "agent-1");
            assert_eq!(tool_id, "get_quote");
            assert!(!success);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

//! Mock tool for tests in this crate and its dependents.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tradeloop_models::{ParamType, ParameterSpec, ToolCategory, ToolDefinition};

use crate::clock::Clock;
use crate::error::ToolFailure;
use crate::tool::{ToolContext, ToolImplementation, ValidatedParameters};

/// A tool that records calls and returns a canned response, optionally after a delay.
pub struct MockTool {
    response: Value,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_params: Mutex<Option<ValidatedParameters>>,
}

impl MockTool {
    pub fn new() -> Self {
        Self {
            response: serde_json::json!({"ok": true}),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    pub fn returning(response: Value) -> Self {
        Self {
            response,
            ..Self::new()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times `execute` was entered.
    pub fn dispatch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `execute` calls seen.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<ValidatedParameters> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }
}

impl Default for MockTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolImplementation for MockTool {
    async fn execute(
        &self,
        params: &ValidatedParameters,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(ToolFailure::new(message.clone())),
            None => Ok(self.response.clone()),
        }
    }
}

/// Definition with one required string `symbol` and an optional bounded `size`.
pub fn mock_definition(id: &str, category: ToolCategory) -> ToolDefinition {
    ToolDefinition::new(id, id, category, "mock tool")
        .with_parameter(ParameterSpec::required("symbol", ParamType::String, "symbol"))
        .with_parameter(
            ParameterSpec::optional("size", ParamType::Number, "size")
                .with_range(Some(1.0), Some(100.0))
                .with_default(serde_json::json!(1)),
        )
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ToolFailure;

/// Parameters that passed schema validation, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedParameters(Map<String, Value>);

impl ValidatedParameters {
    pub(crate) fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Identity of the call being dispatched, handed to the tool implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContext {
    pub agent_id: String,
    pub session_id: Uuid,
    pub call_id: Uuid,
    pub cycle_id: Option<Uuid>,
}

/// Caller-supplied metadata for a gateway call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    /// Decision cycle that issued the call, if any.
    pub cycle_id: Option<Uuid>,
}

impl CallContext {
    pub fn for_cycle(cycle_id: Uuid) -> Self {
        Self {
            cycle_id: Some(cycle_id),
        }
    }
}

/// A tool the gateway can dispatch to.
#[async_trait]
pub trait ToolImplementation: Send + Sync {
    async fn execute(
        &self,
        params: &ValidatedParameters,
        ctx: &ToolContext,
    ) -> Result<Value, ToolFailure>;
}

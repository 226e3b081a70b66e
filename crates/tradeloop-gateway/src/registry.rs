use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::info;
use tradeloop_models::{ToolCategory, ToolDefinition, ToolUsage};

use crate::error::RegistryError;
use crate::permissions::PermissionStore;
use crate::tool::ToolImplementation;

/// A registered tool: its definition, implementation and usage counters.
pub struct RegisteredTool {
    definition: ToolDefinition,
    enabled: AtomicBool,
    implementation: Arc<dyn ToolImplementation>,
    usage: Mutex<ToolUsage>,
}

impl RegisteredTool {
    /// Definition with the current enabled flag.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            enabled: self.is_enabled(),
            ..self.definition.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn category(&self) -> ToolCategory {
        self.definition.category
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn implementation(&self) -> Arc<dyn ToolImplementation> {
        self.implementation.clone()
    }

    pub fn usage(&self) -> ToolUsage {
        match self.usage.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn record_usage(&self, success: bool, response_ms: f64, at: DateTime<Utc>) {
        let mut usage = match self.usage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        usage.record(success, response_ms, at);
    }
}

/// Read-mostly catalog of tools the gateway can dispatch to.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<RegisteredTool>>> {
        match self.tools.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<RegisteredTool>>> {
        match self.tools.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register(
        &self,
        definition: ToolDefinition,
        implementation: Arc<dyn ToolImplementation>,
    ) -> Result<(), RegistryError> {
        let mut tools = self.write();
        if tools.contains_key(&definition.id) {
            return Err(RegistryError::Duplicate(definition.id));
        }

        info!(
            tool_id = %definition.id,
            category = %definition.category,
            version = %definition.version,
            "Registered tool"
        );
        tools.insert(
            definition.id.clone(),
            Arc::new(RegisteredTool {
                enabled: AtomicBool::new(definition.enabled),
                definition,
                implementation,
                usage: Mutex::new(ToolUsage::default()),
            }),
        );
        Ok(())
    }

    /// Remove a tool unless an installed permission set still names it.
    ///
    /// The registry write lock is held across the check so no call can resolve
    /// the tool halfway through removal.
    pub fn unregister(
        &self,
        tool_id: &str,
        permissions: &PermissionStore,
    ) -> Result<ToolDefinition, RegistryError> {
        let mut tools = self.write();
        if !tools.contains_key(tool_id) {
            return Err(RegistryError::Unknown(tool_id.to_string()));
        }

        let agents = permissions.referencing(tool_id);
        if !agents.is_empty() {
            return Err(RegistryError::InUse {
                tool_id: tool_id.to_string(),
                agents,
            });
        }

        let removed = tools
            .remove(tool_id)
            .ok_or_else(|| RegistryError::Unknown(tool_id.to_string()))?;
        info!(tool_id, "Unregistered tool");
        Ok(removed.definition())
    }

    pub fn set_enabled(&self, tool_id: &str, enabled: bool) -> Result<(), RegistryError> {
        let tool = self
            .get(tool_id)
            .ok_or_else(|| RegistryError::Unknown(tool_id.to_string()))?;
        tool.enabled.store(enabled, Ordering::Release);
        info!(tool_id, enabled, "Tool availability changed");
        Ok(())
    }

    /// Look up a tool whether or not it is enabled.
    pub fn get(&self, tool_id: &str) -> Option<Arc<RegisteredTool>> {
        self.read().get(tool_id).cloned()
    }

    pub fn usage(&self, tool_id: &str) -> Option<ToolUsage> {
        self.get(tool_id).map(|t| t.usage())
    }

    /// All definitions, sorted by id.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.read().values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    pub fn by_category(&self, category: ToolCategory) -> Vec<ToolDefinition> {
        self.definitions()
            .into_iter()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

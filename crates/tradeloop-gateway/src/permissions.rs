use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tradeloop_models::{PermissionSet, ToolDefinition};

use crate::error::GatewayError;

/// Installed permission sets, one per agent.
///
/// Sets are immutable once installed; replacement swaps the whole `Arc`, so a
/// call that already resolved its set keeps a consistent view.
#[derive(Debug, Default)]
pub struct PermissionStore {
    sets: RwLock<HashMap<String, Arc<PermissionSet>>>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PermissionSet>>> {
        match self.sets.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PermissionSet>>> {
        match self.sets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Install or replace the set for `set.agent_id`. Returns the previous set.
    pub fn install(&self, set: PermissionSet) -> Option<Arc<PermissionSet>> {
        self.write().insert(set.agent_id.clone(), Arc::new(set))
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<PermissionSet>> {
        self.read().get(agent_id).cloned()
    }

    pub fn remove(&self, agent_id: &str) -> Option<Arc<PermissionSet>> {
        self.write().remove(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.read().contains_key(agent_id)
    }

    /// Agents whose installed set names `tool_id`, sorted.
    pub fn referencing(&self, tool_id: &str) -> Vec<String> {
        let mut agents: Vec<String> = self
            .read()
            .values()
            .filter(|set| set.references(tool_id))
            .map(|set| set.agent_id.clone())
            .collect();
        agents.sort();
        agents
    }
}

/// Allowed when the tool id is granted or its category is, and the id is not blocked.
pub fn check_access(set: &PermissionSet, tool: &ToolDefinition) -> Result<(), GatewayError> {
    let granted =
        set.allowed_tools.contains(&tool.id) || set.allowed_categories.contains(&tool.category);
    if granted && !set.blocked_tools.contains(&tool.id) {
        Ok(())
    } else {
        Err(GatewayError::PermissionDenied {
            agent_id: set.agent_id.clone(),
            tool_id: tool.id.clone(),
        })
    }
}

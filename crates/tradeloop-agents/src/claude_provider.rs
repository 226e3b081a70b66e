use async_trait::async_trait;
use tracing::debug;
use tradeloop_models::{Decision, DecisionRequest};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_decision;
use crate::prompts::decision_system_prompt;
use crate::provider::DecisionProvider;

/// Decision provider backed by the `claude` CLI.
pub struct ClaudeDecisionProvider {
    cli_config: ClaudeCliConfig,
    system_prompt: String,
}

impl ClaudeDecisionProvider {
    pub fn new(cli_config: ClaudeCliConfig) -> Self {
        Self {
            cli_config,
            system_prompt: decision_system_prompt(),
        }
    }

    pub fn cli_config(&self) -> &ClaudeCliConfig {
        &self.cli_config
    }
}

#[async_trait]
impl DecisionProvider for ClaudeDecisionProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn make_decision(&self, request: &DecisionRequest) -> Result<Decision, AgentError> {
        let user_prompt = serde_json::to_string(request)?;
        let raw_output = invoke_claude(&self.system_prompt, &user_prompt, &self.cli_config).await?;
        let decision = parse_decision(&raw_output)?;
        debug!(
            agent_id = %request.agent_id,
            cycle_id = %request.cycle_id,
            action = ?decision.action,
            "Decision parsed"
        );
        Ok(decision)
    }
}

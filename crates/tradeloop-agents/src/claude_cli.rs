use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use tradeloop_models::ProviderConfig;

use crate::error::AgentError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub cli_path: String,
    pub model: String,
    pub timeout: Duration,
}

impl ClaudeCliConfig {
    pub fn from_provider(config: &ProviderConfig, timeout: Duration) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            model: config.model.clone(),
            timeout,
        }
    }
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self::from_provider(&ProviderConfig::default(), Duration::from_secs(60))
    }
}

/// Invoke the CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, cli = %config.cli_path, "Invoking claude CLI");

    let output = tokio::time::timeout(config.timeout, async {
        Command::new(&config.cli_path)
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_millis() as u64))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.cli_path)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "{} exited {}: {}",
            config.cli_path, output.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli("Claude returned empty response".to_string()));
    }

    Ok(stdout)
}

/// Whether the configured CLI binary runs at all.
pub async fn check_cli_available(cli_path: &str) -> bool {
    match Command::new(cli_path).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

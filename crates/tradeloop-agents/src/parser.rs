use tradeloop_models::Decision;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Accepts a bare object, a fenced markdown block (with or without a `json`
/// tag), or an object preceded by prose.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && is_json(trimmed) {
        return Ok(trimmed.to_string());
    }

    if let Some(block) = fenced_block(trimmed) {
        if is_json(&block) {
            return Ok(block);
        }
    }

    if let Some(object) = first_balanced_object(trimmed) {
        if is_json(&object) {
            return Ok(object);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

fn is_json(candidate: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(candidate).is_ok()
}

fn fenced_block(text: &str) -> Option<String> {
    const OPENERS: [&str; 4] = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    OPENERS.iter().find_map(|opener| {
        let start = text.find(opener)? + opener.len();
        let end = text[start..].find("```")?;
        Some(text[start..start + end].trim().to_string())
    })
}

fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a [`Decision`] from raw provider output.
pub fn parse_decision(raw: &str) -> Result<Decision, AgentError> {
    let json = extract_json(raw)?;
    serde_json::from_str(&json)
        .map_err(|e| AgentError::Parse(format!("Failed to parse decision: {e}\nJSON: {json}")))
}

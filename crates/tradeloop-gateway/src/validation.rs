use serde_json::{Map, Value};
use tradeloop_models::{ParamType, ParameterSpec, ToolDefinition};

use crate::tool::ValidatedParameters;

fn type_matches(param_type: ParamType, value: &Value) -> bool {
    match param_type {
        ParamType::String => value.is_string(),
        ParamType::Integer => value.is_i64() || value.is_u64(),
        ParamType::Number => value.is_number(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Array => value.is_array(),
        ParamType::Object => value.is_object(),
    }
}

fn check_value(spec: &ParameterSpec, value: &Value, violations: &mut Vec<String>) {
    if !type_matches(spec.param_type, value) {
        violations.push(format!(
            "parameter `{}` must be of type {}",
            spec.name,
            spec.param_type.as_str()
        ));
        return;
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = spec.min {
            if n < min {
                violations.push(format!("parameter `{}` must be >= {min}", spec.name));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                violations.push(format!("parameter `{}` must be <= {max}", spec.name));
            }
        }
    }

    if let Some(allowed) = &spec.allowed {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            violations.push(format!(
                "parameter `{}` must be one of [{}]",
                spec.name,
                options.join(", ")
            ));
        }
    }
}

/// Check `params` against the tool's schema.
///
/// `null` (or an omitted parameter) counts as absent. Every violation is
/// collected; on success the result carries defaults for omitted parameters.
pub fn validate_parameters(
    definition: &ToolDefinition,
    params: &Value,
) -> Result<ValidatedParameters, Vec<String>> {
    let empty = Map::new();
    let supplied = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(vec![format!(
                "parameters must be an object, got {}",
                json_type(other)
            )])
        }
    };

    let mut violations = Vec::new();
    let mut validated = Map::new();

    for key in supplied.keys() {
        if !definition.parameters.iter().any(|p| &p.name == key) {
            violations.push(format!("unknown parameter `{key}`"));
        }
    }

    for spec in &definition.parameters {
        match supplied.get(&spec.name).filter(|v| !v.is_null()) {
            Some(value) => {
                check_value(spec, value, &mut violations);
                validated.insert(spec.name.clone(), value.clone());
            }
            None if spec.required => {
                violations.push(format!("missing required parameter `{}`", spec.name));
            }
            None => {
                if let Some(default) = &spec.default {
                    validated.insert(spec.name.clone(), default.clone());
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(ValidatedParameters::new(validated))
    } else {
        Err(violations)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

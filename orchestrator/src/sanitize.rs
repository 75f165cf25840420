use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::{FunctionSpec, ParamKind};

/// A model-supplied argument after type coercion and bounds clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ArgValue {
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Str(value) => Value::String(value.clone()),
            ArgValue::Int(value) => Value::Number((*value).into()),
            ArgValue::Bool(value) => Value::Bool(*value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedArgs {
    values: BTreeMap<&'static str, ArgValue>,
}

impl SanitizedArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("missing required argument '{0}'")]
    MissingRequiredArgument(&'static str),
}

/// Validates raw, model-supplied JSON arguments against a function's declared
/// parameters.
///
/// Malformed JSON and non-object payloads are treated as an empty argument
/// set. Values of the wrong type count as absent, numeric values are clamped
/// into their declared range, and absent optional parameters take their
/// declared default. The only failure is a required parameter that is absent
/// after coercion.
pub fn sanitize(spec: &FunctionSpec, raw_arguments: &str) -> Result<SanitizedArgs, SanitizeError> {
    let provided = parse_object(spec, raw_arguments);
    let mut values = BTreeMap::new();
    for param in &spec.parameters {
        let coerced = provided
            .get(param.name)
            .and_then(|value| coerce(param.kind, value));
        match coerced {
            Some(value) => {
                values.insert(param.name, value);
            }
            None if param.required => {
                return Err(SanitizeError::MissingRequiredArgument(param.name));
            }
            None => {
                if provided.contains_key(param.name) {
                    debug!(function = %spec.name, parameter = param.name, "dropping argument with unexpected type");
                }
                if let Some(default) = &param.default {
                    values.insert(param.name, default.clone());
                }
            }
        }
    }
    Ok(SanitizedArgs { values })
}

fn parse_object(spec: &FunctionSpec, raw_arguments: &str) -> Map<String, Value> {
    let trimmed = raw_arguments.trim();
    if trimmed.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(function = %spec.name, kind = json_kind(&other), "tool arguments were not an object");
            Map::new()
        }
        Err(err) => {
            warn!(function = %spec.name, error = %err, "tool arguments were not valid json");
            Map::new()
        }
    }
}

fn coerce(kind: ParamKind, value: &Value) -> Option<ArgValue> {
    match kind {
        ParamKind::String => match value {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| ArgValue::Str(trimmed.to_string()))
            }
            _ => None,
        },
        ParamKind::Integer { min, max } => match value {
            Value::Number(number) => clamp_number(number, min, max).map(ArgValue::Int),
            _ => None,
        },
        ParamKind::Boolean => match value {
            Value::Bool(flag) => Some(ArgValue::Bool(*flag)),
            Value::String(text) if text.trim().eq_ignore_ascii_case("true") => {
                Some(ArgValue::Bool(true))
            }
            Value::String(text) if text.trim().eq_ignore_ascii_case("false") => {
                Some(ArgValue::Bool(false))
            }
            _ => None,
        },
    }
}

fn clamp_number(number: &Number, min: i64, max: i64) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value.clamp(min, max));
    }
    if number.as_u64().is_some() {
        // only reachable above i64::MAX
        return Some(max);
    }
    let value = number.as_f64()?;
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated <= min as f64 {
        Some(min)
    } else if truncated >= max as f64 {
        Some(max)
    } else {
        Some(truncated as i64)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

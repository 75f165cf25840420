//! Stable JSON serialization for function results.
//!
//! Results are read back by the model and by JavaScript clients, so integers
//! outside the IEEE-754 safe range are written as decimal strings. Absent
//! optional fields are skipped at the type level (`skip_serializing_if`)
//! rather than written as `null`.

use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::errors::Result;

pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Serde helper for fields that are always large integers on the wire.
pub fn decimal_string<S>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn to_stable_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    let mut value = serde_json::to_value(value)?;
    normalize(&mut value);
    Ok(value)
}

pub fn to_stable_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = to_stable_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

fn normalize(value: &mut Value) {
    match value {
        Value::Number(number) => {
            if let Some(text) = unsafe_integer(number) {
                *value = Value::String(text);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize),
        Value::Object(map) => map.values_mut().for_each(normalize),
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}

fn unsafe_integer(number: &Number) -> Option<String> {
    if let Some(value) = number.as_u64() {
        return (value > MAX_SAFE_INTEGER).then(|| value.to_string());
    }
    if let Some(value) = number.as_i64() {
        return (value.unsigned_abs() > MAX_SAFE_INTEGER).then(|| value.to_string());
    }
    None
}

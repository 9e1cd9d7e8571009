//! Subscription filter evaluation.
//!
//! A filter maps dot-separated paths into the event data (`client.type`) to
//! either a single expected value or a list of accepted values. Every entry
//! must match for the subscription to be notified.

use serde_json::Value;

use crate::types::FilterCriteria;

pub fn matches(data: &Value, filters: Option<&FilterCriteria>) -> bool {
    let Some(filters) = filters else {
        return true;
    };

    filters.iter().all(|(path, expected)| {
        let Some(actual) = resolve_path(data, path) else {
            return false;
        };
        match expected {
            Value::Array(accepted) => accepted.contains(actual),
            expected => actual == expected,
        }
    })
}

/// Walks nested objects along `path`. Any missing or non-object segment
/// yields `None`.
pub fn resolve_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, key| current.as_object()?.get(key))
}

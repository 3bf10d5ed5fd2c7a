//! Status computation for live objects
//!
//! Reduces a Flux-style object to a [`ReconcileStatus`] using the usual
//! signals: deletion timestamp, observed generation and the `Stalled`,
//! `Reconciling` and `Ready` conditions.

use super::ReconcileStatus;
use serde_json::Value;

/// Compute the reconciliation status of an object's JSON representation
pub fn compute_status(obj: &Value) -> ReconcileStatus {
    let metadata = obj.get("metadata");

    if metadata
        .and_then(|m| m.get("deletionTimestamp"))
        .is_some_and(|t| !t.is_null())
    {
        return ReconcileStatus::InProgress;
    }

    let status = match obj.get("status") {
        Some(status) if !status.is_null() => status,
        _ => return ReconcileStatus::InProgress,
    };

    let generation = metadata
        .and_then(|m| m.get("generation"))
        .and_then(Value::as_i64);
    let observed = status.get("observedGeneration").and_then(Value::as_i64);
    if let (Some(generation), Some(observed)) = (generation, observed) {
        if observed < generation {
            return ReconcileStatus::InProgress;
        }
    }

    let conditions = status
        .get("conditions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    if condition_is_true(conditions, "Stalled") {
        return ReconcileStatus::Failed;
    }
    if condition_is_true(conditions, "Reconciling") {
        return ReconcileStatus::InProgress;
    }

    match find_condition(conditions, "Ready") {
        Some(ready) => match ready.get("status").and_then(Value::as_str) {
            Some("True") => ReconcileStatus::Current,
            Some("False") => {
                let reason = ready.get("reason").and_then(Value::as_str).unwrap_or("");
                if reason.ends_with("Failed") {
                    ReconcileStatus::Failed
                } else {
                    ReconcileStatus::InProgress
                }
            }
            _ => ReconcileStatus::InProgress,
        },
        // No verdict from the controller yet
        None => ReconcileStatus::InProgress,
    }
}

fn find_condition<'a>(conditions: &'a [Value], type_name: &str) -> Option<&'a Value> {
    conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(type_name))
}

fn condition_is_true(conditions: &[Value], type_name: &str) -> bool {
    find_condition(conditions, type_name)
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str)
        == Some("True")
}

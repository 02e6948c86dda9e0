//! Condition bookkeeping on `ResourceStatus`.

use crate::crd::{Condition, ResourceStatus};

/// Set or replace the condition of `condition_type`
///
/// `lastTransitionTime` only moves when the condition's status changes.
pub fn set_condition(
    status: &mut ResourceStatus,
    condition_type: &str,
    value: &str,
    reason: &str,
    message: &str,
    generation: Option<i64>,
) {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match status
        .conditions
        .iter_mut()
        .find(|c| c.r#type == condition_type)
    {
        Some(existing) => {
            if existing.status != value {
                existing.last_transition_time = Some(now);
            }
            existing.status = value.to_string();
            existing.reason = Some(reason.to_string());
            existing.message = Some(message.to_string());
            existing.observed_generation = generation;
        }
        None => status.conditions.push(Condition {
            r#type: condition_type.to_string(),
            status: value.to_string(),
            observed_generation: generation,
            last_transition_time: Some(now),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }),
    }
}

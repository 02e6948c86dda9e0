//! # Resource Status
//!
//! Status shared by every declared kind: generation bookkeeping, conditions and
//! the identity of the external resource.

use serde::{Deserialize, Serialize};

/// Condition type set once the engine has seen the object.
pub const CONDITION_INITIALIZED: &str = "Initialized";
/// Condition type tracking whether the external resource matches the spec.
pub const CONDITION_READY: &str = "Ready";
/// Condition type tracking the last failed attempt.
pub const CONDITION_ERROR: &str = "Error";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Status of a declared resource
///
/// Written only by the controller, always through a merge patch computed
/// against the status read at the start of the reconciliation pass.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Last generation whose external action completed successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Identifier assigned by the external service (or the resolved name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// SHA-256 of the last body applied successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_hash: Option<String>,
    /// Last completed reconciliation (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<String>,
    /// Deletion attempts made while the external identity was unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unresolved_delete_attempts: Option<u32>,
}

impl ResourceStatus {
    /// Find a condition by type
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Whether the condition of the given type has status `True`
    #[must_use]
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == STATUS_TRUE)
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Generation the condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Last transition time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

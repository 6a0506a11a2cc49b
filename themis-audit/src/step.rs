//! A single buffered SAGA step record (spec.md §3.5/§4.7).
//!
//! Grounded in `original_source/include/utils/saga_logger.h`'s
//! `SAGAStep`: a saga id, a named step within that saga, a forward/
//! compensate action, the entity it touched, an arbitrary JSON payload,
//! and a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `"forward"` or `"compensate"` — which direction of the saga this step
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Forward,
    Compensate,
}

/// `"success"`, `"failed"`, or `"pending"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStep {
    pub saga_id: String,
    pub step_name: String,
    pub action: StepAction,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
}

impl SagaStep {
    #[must_use]
    pub fn new(
        saga_id: impl Into<String>,
        step_name: impl Into<String>,
        action: StepAction,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
        status: StepStatus,
    ) -> Self {
        Self {
            saga_id: saga_id.into(),
            step_name: step_name.into(),
            action,
            entity_id: entity_id.into(),
            payload,
            status,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn step_serializes_action_and_status_as_lowercase_strings() {
        let step = SagaStep::new(
            "saga-1",
            "debit",
            StepAction::Forward,
            "acct-1",
            serde_json::json!({"amount": 100}),
            StepStatus::Success,
        );
        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["action"], "forward");
        assert_eq!(v["status"], "success");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milestone steps a driver reports while working a job. Unknown step
/// identifiers are kept verbatim in `Other` so new client-side checkpoints
/// round-trip through storage without a deploy here; they never project
/// assignment status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "String", from = "String")]
pub enum Milestone {
    NavigateToPickup,
    ArrivedAtPickup,
    Loaded,
    InTransit,
    ArrivedAtDropoff,
    Unloaded,
    JobCompleted,
    Other(String),
}

impl Milestone {
    pub fn as_str(&self) -> &str {
        match self {
            Milestone::NavigateToPickup => "navigate_to_pickup",
            Milestone::ArrivedAtPickup => "arrived_at_pickup",
            Milestone::Loaded => "loaded",
            Milestone::InTransit => "in_transit",
            Milestone::ArrivedAtDropoff => "arrived_at_dropoff",
            Milestone::Unloaded => "unloaded",
            Milestone::JobCompleted => "job_completed",
            Milestone::Other(raw) => raw,
        }
    }
}

impl From<String> for Milestone {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "navigate_to_pickup" => Milestone::NavigateToPickup,
            "arrived_at_pickup" => Milestone::ArrivedAtPickup,
            "loaded" => Milestone::Loaded,
            "in_transit" => Milestone::InTransit,
            "arrived_at_dropoff" => Milestone::ArrivedAtDropoff,
            "unloaded" => Milestone::Unloaded,
            "job_completed" => Milestone::JobCompleted,
            _ => Milestone::Other(raw),
        }
    }
}

impl From<Milestone> for String {
    fn from(step: Milestone) -> Self {
        step.as_str().to_string()
    }
}

/// Immutable milestone record. Appended unconditionally for every reported
/// step; the assignment status is a projection over these, never the other
/// way around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub assignment_id: Uuid,
    pub step: Milestone,
    pub note: Option<String>,
    pub actor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

//! Messages exchanged with the backend and pushed to UI consumers
//!
//! `StatusReport` and `SubmissionResponse` mirror the backend JSON.
//! `NotifierMessage` keeps the shape the realtime consumers were written
//! against (`type`, `progress`, `current_step`, `total_meals`,
//! `completed_meals`).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::generation::{JobId, JobStatus};

/// Response of the job submission endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub id: JobId,
    #[serde(default = "default_submission_status")]
    pub status: JobStatus,
}

const fn default_submission_status() -> JobStatus {
    JobStatus::Pending
}

/// Response of the job status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub generation_time_seconds: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    /// Everything else the backend sent (the plan itself on success)
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            generation_time_seconds: None,
            error: None,
            payload: serde_json::Map::new(),
        }
    }

    /// Payload forwarded to consumers with the completed snapshot
    pub fn meal_plan(&self) -> Option<serde_json::Value> {
        if self.payload.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(self.payload.clone()))
        }
    }
}

/// Message kinds published by the realtime notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NotifierMessageKind {
    MealPlanProgress,
}

/// Realtime message as consumed by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NotifierMessage {
    #[serde(rename = "type")]
    pub kind: NotifierMessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_plan_id: Option<JobId>,
    pub progress: u8,
    pub current_step: String,
    pub total_meals: u32,
    pub completed_meals: u32,
}

/// Events a consumer can send through the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Ask for progress updates on a meal plan
    RequestProgress { meal_plan_id: JobId, total_meals: u32 },
    Ping,
}

/// Signed-in user, as far as the notifier needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
}

/// Authentication session lifecycle, broadcast by the API client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A request came back 401; stored tokens were cleared
    Expired { path: String },
}

//! Progress snapshots delivered to consumers

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::generation::JobId;

/// Flags and payload attached to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProgressExtra {
    /// Generation finished (or was assumed finished after a timeout)
    pub completed: bool,
    /// Backend reported failure or submission failed
    pub error: bool,
    /// Attempt budget ran out before the backend reached a terminal status
    pub timed_out: bool,
    /// Status payload returned with the completed plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub meal_plan: Option<serde_json::Value>,
}

/// One progress update for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    /// 0..=100, never decreasing within one job
    pub percent: u8,
    pub message: String,
    pub completed_units: u32,
    pub total_units: u32,
    pub elapsed_seconds: f64,
    pub extra: ProgressExtra,
}

impl ProgressSnapshot {
    /// No further snapshots follow a terminal one
    pub const fn is_terminal(&self) -> bool {
        self.extra.completed || self.extra.error || self.extra.timed_out
    }

    pub const fn is_success(&self) -> bool {
        self.extra.completed && !self.extra.error
    }

    /// Share of meal units the percent corresponds to
    pub fn units_for(percent: u8, total_units: u32) -> u32 {
        let share = f64::from(percent.min(100)) / 100.0 * f64::from(total_units);
        (share.round() as u32).min(total_units)
    }
}

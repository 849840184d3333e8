//! Generation request, job identity and the time estimate derived from them
//!
//! A [`GenerationRequest`] is what the user submits. It becomes exactly one
//! [`GenerationJob`], whose [`JobEstimate`] stays fixed for the whole job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Prefix for ids the client invents before the backend has assigned one
pub const TEMPORARY_ID_PREFIX: &str = "temp-";

/// Meal plan generation request as submitted by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub duration_days: u32,
    pub family_size: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    /// Opaque to this crate, forwarded as-is
    #[serde(default)]
    pub preferences: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(duration_days: u32, family_size: u32, start_date: NaiveDate) -> Self {
        Self {
            duration_days,
            family_size,
            start_date,
            goals: Vec::new(),
            dietary_restrictions: Vec::new(),
            preferences: serde_json::Value::Null,
        }
    }

    /// Rejects requests the estimate cannot be built from
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_days == 0 {
            return Err("duration_days must be greater than 0".to_string());
        }
        if self.family_size == 0 {
            return Err("family_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Job identifier, either server-assigned or a local placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Placeholder id used until the submission response arrives
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Utc::now().timestamp_millis()))
    }

    /// The backend does not know temporary ids; never poll them
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authoritative job status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum JobStatus {
    Pending,
    Generating,
    /// Generation finished and the plan is live
    Active,
    Failed,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Active => "active",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Generation speed selected for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Fast,
    Standard,
}

/// Per-mode timing parameters for the estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTiming {
    pub seconds_per_unit: u64,
    pub floor_seconds: u64,
}

/// Time estimate for one job; constant for the job's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEstimate {
    pub meals_per_day: u32,
    pub total_meal_units: u32,
    pub estimated_seconds: u64,
}

impl JobEstimate {
    /// Families larger than two get a snack slot on top of three meals
    pub const fn meals_per_day(family_size: u32) -> u32 {
        if family_size > 2 { 4 } else { 3 }
    }

    pub fn for_request(request: &GenerationRequest, timing: ModeTiming) -> Self {
        let meals_per_day = Self::meals_per_day(request.family_size);
        let total_meal_units = request.duration_days.saturating_mul(meals_per_day);
        Self::for_units(total_meal_units, meals_per_day, timing)
    }

    /// Estimate when only the unit count is known
    pub fn for_units(total_meal_units: u32, meals_per_day: u32, timing: ModeTiming) -> Self {
        let raw = u64::from(total_meal_units).saturating_mul(timing.seconds_per_unit);
        Self {
            meals_per_day,
            total_meal_units,
            // never zero, the estimator divides by it
            estimated_seconds: raw.max(timing.floor_seconds).max(1),
        }
    }

    pub fn estimated_secs_f64(&self) -> f64 {
        self.estimated_seconds as f64
    }
}

/// One tracked generation job
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub id: JobId,
    pub status: JobStatus,
    pub estimate: JobEstimate,
    pub started_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Job tracked under a temporary id until the backend answers
    pub fn provisional(estimate: JobEstimate) -> Self {
        Self::with_id(JobId::temporary(), estimate)
    }

    pub fn with_id(id: JobId, estimate: JobEstimate) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            estimate,
            started_at: Utc::now(),
        }
    }

    pub const fn estimated_seconds(&self) -> u64 {
        self.estimate.estimated_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FAST: ModeTiming = ModeTiming { seconds_per_unit: 2, floor_seconds: 30 };
    const STANDARD: ModeTiming = ModeTiming { seconds_per_unit: 8, floor_seconds: 120 };

    fn request(days: u32, family: u32) -> GenerationRequest {
        GenerationRequest::new(days, family, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
    }

    #[rstest]
    #[case(7, 4, FAST, 4, 28, 56)]
    #[case(7, 2, FAST, 3, 21, 42)]
    #[case(1, 1, FAST, 3, 3, 30)]
    #[case(1, 1, STANDARD, 3, 3, 120)]
    #[case(14, 5, STANDARD, 4, 56, 448)]
    fn estimate_matches_formula(
        #[case] days: u32,
        #[case] family: u32,
        #[case] timing: ModeTiming,
        #[case] meals_per_day: u32,
        #[case] units: u32,
        #[case] seconds: u64,
    ) {
        let estimate = JobEstimate::for_request(&request(days, family), timing);
        assert_eq!(estimate.meals_per_day, meals_per_day);
        assert_eq!(estimate.total_meal_units, units);
        assert_eq!(estimate.estimated_seconds, seconds);
    }

    #[test]
    fn zero_floor_still_gives_nonzero_estimate() {
        let timing = ModeTiming { seconds_per_unit: 0, floor_seconds: 0 };
        let estimate = JobEstimate::for_request(&request(3, 2), timing);
        assert_eq!(estimate.estimated_seconds, 1);
    }

    #[test]
    fn temporary_ids_are_recognized() {
        assert!(JobId::temporary().is_temporary());
        assert!(!JobId::new("8f2c1a").is_temporary());
    }

    #[test]
    fn validation_rejects_empty_dimensions() {
        assert!(request(0, 2).validate().is_err());
        assert!(request(3, 0).validate().is_err());
        assert!(request(3, 2).validate().is_ok());
    }

    #[test]
    fn status_deserializes_lowercase() {
        let status: JobStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, JobStatus::Active);
        assert!(status.is_terminal());
        assert!(serde_json::from_str::<JobStatus>("\"archived\"").is_err());
    }
}

//! Synthetic progress for one generation job
//!
//! Elapsed time against the job estimate drives the percentage up to a soft
//! cap; only an authoritative `active` status reports 100. The displayed
//! percentage never goes down within a job.

use crate::domain::{JobEstimate, JobId, JobStatus, ProgressExtra, ProgressSnapshot, StatusReport};
use crate::infrastructure::config::{ProgressConfig, TimeoutPolicy};

pub struct ProgressEstimator {
    job_id: JobId,
    estimate: JobEstimate,
    cap: u8,
    jitter_max: u8,
    phases: Vec<String>,
    last_percent: u8,
    rng: fastrand::Rng,
}

impl ProgressEstimator {
    pub fn new(job_id: JobId, estimate: JobEstimate, config: &ProgressConfig) -> Self {
        Self::with_rng(job_id, estimate, config, fastrand::Rng::new())
    }

    /// Deterministic jitter, for tests and benchmarks
    pub fn with_seed(job_id: JobId, estimate: JobEstimate, config: &ProgressConfig, seed: u64) -> Self {
        Self::with_rng(job_id, estimate, config, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(job_id: JobId, estimate: JobEstimate, config: &ProgressConfig, rng: fastrand::Rng) -> Self {
        let phases = if config.phase_messages.is_empty() {
            vec!["Generating your meal plan...".to_string()]
        } else {
            config.phase_messages.clone()
        };
        Self {
            job_id,
            estimate,
            cap: config.cap_percent.min(99),
            jitter_max: config.jitter_max_percent,
            phases,
            last_percent: 0,
            rng,
        }
    }

    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub const fn estimate(&self) -> &JobEstimate {
        &self.estimate
    }

    pub const fn last_percent(&self) -> u8 {
        self.last_percent
    }

    /// Follow the job under its server-assigned id; progress carries over
    pub fn rebind(&mut self, job_id: JobId) {
        self.job_id = job_id;
    }

    /// Start over for a different job
    pub fn reset(&mut self, job_id: JobId, estimate: JobEstimate) {
        self.job_id = job_id;
        self.estimate = estimate;
        self.last_percent = 0;
    }

    /// `min(elapsed / estimate * cap, cap)`, before jitter
    pub fn time_progress(&self, elapsed_secs: f64) -> f64 {
        let cap = f64::from(self.cap);
        let ratio = elapsed_secs.max(0.0) / self.estimate.estimated_secs_f64();
        (ratio * cap).min(cap)
    }

    /// Phase description for a percentage, equal-width buckets over 0..100
    pub fn phase_message(&self, percent: u8) -> &str {
        let bucket = 100.0 / self.phases.len() as f64;
        let index = (f64::from(percent) / bucket).floor() as usize;
        &self.phases[index.min(self.phases.len() - 1)]
    }

    /// Next snapshot given elapsed time and, if the poll succeeded, the server status
    pub fn observe(&mut self, elapsed_secs: f64, server: Option<&StatusReport>) -> ProgressSnapshot {
        match server {
            Some(report) if report.status == JobStatus::Active => self.completed(elapsed_secs, report),
            Some(report) if report.status == JobStatus::Failed => {
                self.failed(elapsed_secs, report.error.as_deref())
            }
            _ => self.time_based(elapsed_secs),
        }
    }

    fn time_based(&mut self, elapsed_secs: f64) -> ProgressSnapshot {
        let progress = self.time_progress(elapsed_secs);
        let jitter = if self.jitter_max > 0 && progress < f64::from(self.cap) {
            f64::from(self.rng.u8(0..=self.jitter_max))
        } else {
            0.0
        };
        let candidate = (progress + jitter).min(f64::from(self.cap)).floor() as u8;
        let percent = candidate.max(self.last_percent);
        self.last_percent = percent;

        let message = self.phase_message(percent).to_string();
        self.snapshot(percent, message, elapsed_secs, ProgressExtra::default())
    }

    fn completed(&mut self, elapsed_secs: f64, report: &StatusReport) -> ProgressSnapshot {
        let generation_secs = report.generation_time_seconds.unwrap_or(elapsed_secs);
        self.last_percent = 100;
        let message = format!("Meal plan ready! Generated in {generation_secs:.0}s");
        self.snapshot(
            100,
            message,
            elapsed_secs,
            ProgressExtra {
                completed: true,
                meal_plan: report.meal_plan(),
                ..Default::default()
            },
        )
    }

    /// Terminal error snapshot; percent drops to 0 by contract
    pub fn failed(&mut self, elapsed_secs: f64, reason: Option<&str>) -> ProgressSnapshot {
        let message = match reason {
            Some(reason) if !reason.is_empty() => format!("Meal plan generation failed: {reason}"),
            _ => "Meal plan generation failed".to_string(),
        };
        self.snapshot(
            0,
            message,
            elapsed_secs,
            ProgressExtra {
                error: true,
                ..Default::default()
            },
        )
    }

    /// Terminal snapshot once the attempt budget is spent
    pub fn timed_out(&mut self, elapsed_secs: f64, policy: TimeoutPolicy) -> ProgressSnapshot {
        match policy {
            TimeoutPolicy::FailOpen => {
                self.last_percent = 100;
                self.snapshot(
                    100,
                    "Your meal plan should be ready - refresh to view it".to_string(),
                    elapsed_secs,
                    ProgressExtra {
                        completed: true,
                        timed_out: true,
                        ..Default::default()
                    },
                )
            }
            TimeoutPolicy::ReportTimedOut => self.snapshot(
                self.last_percent,
                "Generation is taking longer than expected; check back shortly".to_string(),
                elapsed_secs,
                ProgressExtra {
                    timed_out: true,
                    ..Default::default()
                },
            ),
        }
    }

    fn snapshot(&self, percent: u8, message: String, elapsed_secs: f64, extra: ProgressExtra) -> ProgressSnapshot {
        let total_units = self.estimate.total_meal_units;
        ProgressSnapshot {
            job_id: self.job_id.clone(),
            percent,
            message,
            completed_units: ProgressSnapshot::units_for(percent, total_units),
            total_units,
            elapsed_seconds: elapsed_secs,
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GenerationRequest, ModeTiming};
    use chrono::NaiveDate;

    fn estimate(days: u32, family: u32) -> JobEstimate {
        let request = GenerationRequest::new(days, family, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        JobEstimate::for_request(&request, ModeTiming { seconds_per_unit: 2, floor_seconds: 30 })
    }

    fn estimator(jitter: u8) -> ProgressEstimator {
        let config = ProgressConfig {
            jitter_max_percent: jitter,
            ..ProgressConfig::default()
        };
        ProgressEstimator::with_seed(JobId::new("mp-1"), estimate(7, 4), &config, 7)
    }

    #[test]
    fn half_of_estimate_is_half_of_cap() {
        let mut est = estimator(0);
        assert_eq!(est.estimate().estimated_seconds, 56);
        assert!((est.time_progress(28.0) - 44.0).abs() < f64::EPSILON);
        let snap = est.observe(28.0, None);
        assert_eq!(snap.percent, 44);
        assert!(!snap.is_terminal());
    }

    #[test]
    fn time_progress_stops_at_cap() {
        let mut est = estimator(3);
        let snap = est.observe(10_000.0, None);
        assert_eq!(snap.percent, 88);
        assert_eq!(est.observe(20_000.0, None).percent, 88);
    }

    #[test]
    fn percent_never_regresses() {
        let mut est = estimator(3);
        let first = est.observe(40.0, None).percent;
        // clock skew: an earlier elapsed value must not pull the bar back
        let second = est.observe(5.0, None).percent;
        assert!(second >= first);
    }

    #[test]
    fn active_status_jumps_to_100() {
        let mut est = estimator(0);
        est.observe(3.0, None);
        let mut report = StatusReport::new(JobStatus::Active);
        report.generation_time_seconds = Some(47.2);
        report.payload.insert("id".into(), serde_json::json!("mp-1"));

        let snap = est.observe(6.0, Some(&report));
        assert_eq!(snap.percent, 100);
        assert!(snap.is_success());
        assert!(snap.message.contains("47s"));
        assert_eq!(snap.completed_units, snap.total_units);
        assert_eq!(snap.extra.meal_plan.unwrap()["id"], "mp-1");
    }

    #[test]
    fn failed_status_is_terminal_error() {
        let mut est = estimator(0);
        est.observe(30.0, None);
        let mut report = StatusReport::new(JobStatus::Failed);
        report.error = Some("no recipes match".into());

        let snap = est.observe(33.0, Some(&report));
        assert_eq!(snap.percent, 0);
        assert!(snap.extra.error && snap.is_terminal());
        assert!(snap.message.ends_with("no recipes match"));
    }

    #[test]
    fn non_terminal_status_is_time_based() {
        let mut est = estimator(0);
        let snap = est.observe(28.0, Some(&StatusReport::new(JobStatus::Generating)));
        assert_eq!(snap.percent, 44);
    }

    #[test]
    fn phase_messages_cover_the_range() {
        let est = estimator(0);
        assert_eq!(est.phase_message(0), "Analyzing your preferences...");
        assert_eq!(est.phase_message(17), "Finding recipes that match your goals...");
        assert_eq!(est.phase_message(88), "Finalizing your meal plan...");
        assert_eq!(est.phase_message(100), "Finalizing your meal plan...");
    }

    #[test]
    fn timeout_policies() {
        let mut est = estimator(0);
        est.observe(28.0, None);
        let open = est.timed_out(90.0, TimeoutPolicy::FailOpen);
        assert_eq!(open.percent, 100);
        assert!(open.extra.completed && open.extra.timed_out);

        let mut est = estimator(0);
        est.observe(28.0, None);
        let strict = est.timed_out(90.0, TimeoutPolicy::ReportTimedOut);
        assert_eq!(strict.percent, 44);
        assert!(!strict.extra.completed && strict.is_terminal());
    }

    #[test]
    fn reset_starts_a_new_job_from_zero() {
        let mut est = estimator(0);
        est.observe(50.0, None);
        est.reset(JobId::new("mp-2"), estimate(1, 1));
        assert_eq!(est.last_percent(), 0);
        let snap = est.observe(3.0, None);
        assert_eq!(snap.job_id.as_str(), "mp-2");
        assert_eq!(snap.percent, 8);
    }
}

//! Scripted backend and helpers shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use mealplan_progress_lib::domain::{
    GenerationRequest, JobEstimate, JobId, JobStatus, ModeTiming, ProgressSnapshot, StatusReport,
    SubmissionResponse,
};
use mealplan_progress_lib::infrastructure::{ApiError, MealPlanBackend};

/// Backend that answers status polls from a script, then repeats `fallback`
pub struct FakeBackend {
    replies: Mutex<VecDeque<Result<StatusReport, u16>>>,
    fallback: StatusReport,
    submission: Result<JobId, u16>,
    submit_delay: Duration,
    stall: Stall,
    fetched: Mutex<Vec<JobId>>,
}

/// How long a status poll takes before the scripted answer
#[derive(Clone, Copy)]
enum Stall {
    None,
    For(Duration),
    Forever,
}

impl FakeBackend {
    /// Reports `generating` forever unless scripted otherwise
    pub fn generating() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: StatusReport::new(JobStatus::Generating),
            submission: Ok(JobId::new("mp-1")),
            submit_delay: Duration::ZERO,
            stall: Stall::None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn then_status(self, status: JobStatus) -> Self {
        self.then_report(StatusReport::new(status))
    }

    pub fn then_report(self, report: StatusReport) -> Self {
        self.replies.lock().unwrap().push_back(Ok(report));
        self
    }

    pub fn then_http_error(self, status: u16) -> Self {
        self.replies.lock().unwrap().push_back(Err(status));
        self
    }

    pub fn submits(mut self, id: &str, delay: Duration) -> Self {
        self.submission = Ok(JobId::new(id));
        self.submit_delay = delay;
        self
    }

    /// Every status poll takes `delay` before answering
    pub fn slow_polls(mut self, delay: Duration) -> Self {
        self.stall = Stall::For(delay);
        self
    }

    /// Status polls never answer
    pub fn hung_polls(mut self) -> Self {
        self.stall = Stall::Forever;
        self
    }

    pub fn rejects_submission(mut self, status: u16) -> Self {
        self.submission = Err(status);
        self
    }

    pub fn fetched_ids(&self) -> Vec<JobId> {
        self.fetched.lock().unwrap().clone()
    }
}

fn http_error(status: u16, path: &str) -> ApiError {
    ApiError::Http {
        status,
        path: path.to_string(),
        body: String::new(),
    }
}

#[async_trait]
impl MealPlanBackend for FakeBackend {
    async fn submit_generation(&self, _request: &GenerationRequest) -> Result<SubmissionResponse, ApiError> {
        tokio::time::sleep(self.submit_delay).await;
        match &self.submission {
            Ok(id) => Ok(SubmissionResponse {
                id: id.clone(),
                status: JobStatus::Pending,
            }),
            Err(status) => Err(http_error(*status, "/meal-plans/generate/")),
        }
    }

    async fn fetch_status(&self, id: &JobId) -> Result<StatusReport, ApiError> {
        if id.is_temporary() {
            return Err(ApiError::TemporaryId(id.clone()));
        }
        self.fetched.lock().unwrap().push(id.clone());
        match self.stall {
            Stall::None => {}
            Stall::For(delay) => tokio::time::sleep(delay).await,
            Stall::Forever => std::future::pending::<()>().await,
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(report)) => Ok(report),
            Some(Err(status)) => Err(http_error(status, &format!("/meal-plans/{id}/"))),
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn request(days: u32, family: u32) -> GenerationRequest {
    GenerationRequest::new(days, family, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
}

pub const FAST: ModeTiming = ModeTiming {
    seconds_per_unit: 2,
    floor_seconds: 30,
};

pub fn estimate(days: u32, family: u32) -> JobEstimate {
    JobEstimate::for_request(&request(days, family), FAST)
}

/// Everything the sink received so far
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressSnapshot>) -> Vec<ProgressSnapshot> {
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    snapshots
}

pub fn assert_monotonic(snapshots: &[ProgressSnapshot]) {
    let running: Vec<_> = snapshots.iter().filter(|s| !s.extra.error).map(|s| s.percent).collect();
    assert!(
        running.windows(2).all(|w| w[0] <= w[1]),
        "percent regressed: {running:?}"
    );
}

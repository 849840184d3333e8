//! Meal plan generation use cases
//!
//! Ties submission to tracking: the request is validated, its estimate
//! computed for the configured mode, and a poller started. Progress starts
//! moving right away under a temporary id while the submission is in flight.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::generation_poller::{GenerationPoller, JobHandle, ProgressSink};
use super::progress_estimator::ProgressEstimator;
use crate::domain::{GenerationJob, GenerationRequest, JobEstimate, JobId};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::MealPlanError;
use crate::infrastructure::meal_plan_api::MealPlanBackend;

/// High-level meal plan generation use cases
pub struct MealPlanService {
    backend: Arc<dyn MealPlanBackend>,
    config: AppConfig,
}

impl MealPlanService {
    pub fn new(backend: Arc<dyn MealPlanBackend>, config: AppConfig) -> Self {
        Self { backend, config }
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Estimate for a request under the configured generation mode
    pub fn estimate(&self, request: &GenerationRequest) -> JobEstimate {
        let progress = &self.config.progress;
        JobEstimate::for_request(request, progress.timing(progress.mode))
    }

    /// Submit in the background and start tracking immediately.
    ///
    /// The job runs under a temporary id until the backend answers; a failed
    /// submission ends tracking with an error snapshot.
    pub fn generate(
        &self,
        request: GenerationRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<JobHandle, MealPlanError> {
        request.validate().map_err(MealPlanError::Validation)?;
        let estimate = self.estimate(&request);
        let job = GenerationJob::provisional(estimate);
        info!(
            job_id = %job.id,
            days = request.duration_days,
            family_size = request.family_size,
            estimated_seconds = estimate.estimated_seconds,
            "Starting meal plan generation"
        );

        let handle = self.spawn_poller(job, sink);
        let control = handle.control();
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            match backend.submit_generation(&request).await {
                Ok(response) => {
                    if !control.assign_id(response.id) {
                        debug!("Tracking ended before the backend assigned an id");
                    }
                }
                Err(e) => {
                    warn!("Meal plan submission failed: {}", e);
                    control.fail(e.to_string());
                }
            }
        });

        Ok(handle)
    }

    /// Submit first, then track under the server id
    pub async fn submit_and_track(
        &self,
        request: GenerationRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<JobHandle, MealPlanError> {
        request.validate().map_err(MealPlanError::Validation)?;
        let estimate = self.estimate(&request);
        let response = self.backend.submit_generation(&request).await?;
        Ok(self.track(response.id, estimate, sink))
    }

    /// Follow a job the backend already knows about
    pub fn track(&self, id: JobId, estimate: JobEstimate, sink: Arc<dyn ProgressSink>) -> JobHandle {
        self.spawn_poller(GenerationJob::with_id(id, estimate), sink)
    }

    fn spawn_poller(&self, job: GenerationJob, sink: Arc<dyn ProgressSink>) -> JobHandle {
        let estimator = ProgressEstimator::new(job.id.clone(), job.estimate, &self.config.progress);
        GenerationPoller::spawn(
            job,
            Arc::clone(&self.backend),
            self.config.polling.clone(),
            estimator,
            sink,
        )
    }
}

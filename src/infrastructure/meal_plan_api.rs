//! Meal-planning backend port and its HTTP adapter

use async_trait::async_trait;
use std::sync::Arc;

use super::error::ApiError;
use super::http_client::ApiClient;
use crate::domain::{GenerationRequest, JobId, StatusReport, SubmissionResponse};

/// The two backend calls job tracking depends on
#[async_trait]
pub trait MealPlanBackend: Send + Sync {
    async fn submit_generation(&self, request: &GenerationRequest) -> Result<SubmissionResponse, ApiError>;

    /// Must not be called for temporary ids
    async fn fetch_status(&self, id: &JobId) -> Result<StatusReport, ApiError>;
}

pub struct HttpMealPlanBackend {
    client: Arc<ApiClient>,
}

impl HttpMealPlanBackend {
    pub const fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn status_path(&self, id: &JobId) -> String {
        let base = self.client.config().status_path.trim_end_matches('/');
        format!("{base}/{}/", id.as_str())
    }
}

#[async_trait]
impl MealPlanBackend for HttpMealPlanBackend {
    async fn submit_generation(&self, request: &GenerationRequest) -> Result<SubmissionResponse, ApiError> {
        let path = self.client.config().submit_path.clone();
        let response: SubmissionResponse = self.client.post_json(&path, request).await?;
        tracing::info!(job_id = %response.id, status = %response.status, "Meal plan generation submitted");
        Ok(response)
    }

    async fn fetch_status(&self, id: &JobId) -> Result<StatusReport, ApiError> {
        if id.is_temporary() {
            return Err(ApiError::TemporaryId(id.clone()));
        }
        self.client.get_json(&self.status_path(id)).await
    }
}

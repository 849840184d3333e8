//! Error types for backend access and job tracking

use thiserror::Error;

use crate::domain::JobId;

/// Failures talking to the meal-planning backend
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {path}: {body}")]
    Http {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Session expired while requesting {path}")]
    SessionExpired { path: String },

    #[error("Failed to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Job {0} has a temporary id and is unknown to the backend")]
    TemporaryId(JobId),

    #[error("Invalid API configuration: {0}")]
    InvalidConfig(String),

    #[error("Token store error: {0}")]
    TokenStore(String),
}

impl ApiError {
    /// Server-side and transport failures worth another poll
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Decode { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::SessionExpired { .. }
            | Self::TemporaryId(_)
            | Self::InvalidConfig(_)
            | Self::TokenStore(_) => false,
        }
    }
}

/// Failures starting or following a generation job
#[derive(Error, Debug)]
pub enum MealPlanError {
    #[error("Invalid generation request: {0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Job tracking was cancelled")]
    Cancelled,
}

/// Failures of the realtime notifier facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    #[error("Notifier is not connected")]
    NotConnected,
}

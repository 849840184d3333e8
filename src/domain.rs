//! Domain module - meal plan generation jobs and their progress
//!
//! Plain data shared by the estimator, the poller and the notifier.
//! Nothing here performs I/O.

pub mod events;
pub mod generation;
pub mod progress;

pub use events::{
    NotifierMessage, NotifierMessageKind, OutboundEvent, SessionEvent, StatusReport,
    SubmissionResponse, UserContext,
};
pub use generation::{
    GenerationJob, GenerationMode, GenerationRequest, JobEstimate, JobId, JobStatus, ModeTiming,
    TEMPORARY_ID_PREFIX,
};
pub use progress::{ProgressExtra, ProgressSnapshot};

//! Application layer module
//!
//! Job tracking use cases: the progress estimator, the per-job polling loop,
//! the simulated realtime notifier and the service that wires them to the
//! backend.

pub mod generation_poller;
pub mod meal_plan_service;
pub mod progress_estimator;
pub mod realtime_notifier;

pub use generation_poller::{
    ChannelSink, GenerationPoller, JobControl, JobHandle, JobOutcome, JobReport, ProgressSink,
};
pub use meal_plan_service::MealPlanService;
pub use progress_estimator::ProgressEstimator;
pub use realtime_notifier::{ConnectionState, RealtimeNotifier};

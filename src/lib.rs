//! mealplan-progress - progress tracking for meal plan generation jobs
//!
//! Submits generation requests to the meal-planning backend and turns the
//! wait into a monotonic progress stream: elapsed time against an estimate,
//! corrected by periodic status polls, ending in exactly one terminal
//! snapshot.

pub mod application;
pub mod domain;
pub mod infrastructure;

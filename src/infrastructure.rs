//! Infrastructure layer: backend access, token storage, configuration and logging

pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod meal_plan_api;
pub mod token_store;

pub use config::{AppConfig, ConfigError, ConfigManager, TimeoutPolicy};
pub use error::{ApiError, MealPlanError, NotifierError};
pub use http_client::ApiClient;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use meal_plan_api::{HttpMealPlanBackend, MealPlanBackend};
pub use token_store::{FileTokenStore, InMemoryTokenStore, TokenPair, TokenStore};

//! Configuration infrastructure
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (`config/default`, then `config/{env}`)
//! 3. Environment variables prefixed `MEALPLAN`, `__` between sections
//!    (e.g. `MEALPLAN__POLLING__TICK_INTERVAL_MS=1500`)

#![allow(clippy::derivable_impls)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::domain::{GenerationMode, ModeTiming};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub progress: ProgressConfig,
    pub polling: PollingConfig,
    pub notifier: NotifierConfig,
    pub logging: LoggingConfig,
}

/// Backend endpoints and HTTP client behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// POST target for new generation jobs
    pub submit_path: String,
    /// GET `{status_path}/{id}` for job status
    pub status_path: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub user_agent: String,
    /// Token file; platform data dir when unset
    pub token_file: Option<PathBuf>,
}

/// Estimator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub mode: GenerationMode,
    pub fast: ModeTiming,
    pub standard: ModeTiming,
    /// Ceiling for time-based progress; only a real completion shows 100
    pub cap_percent: u8,
    /// Upper bound of the random nudge added to time-based progress
    pub jitter_max_percent: u8,
    /// Ordered phase descriptions, mapped onto equal percent buckets
    pub phase_messages: Vec<String>,
}

/// What to report when the attempt budget runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Report completion so the UI never hangs
    #[default]
    FailOpen,
    /// Report a distinct timed-out terminal state
    ReportTimedOut,
}

/// Polling loop cadence and budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub tick_interval_ms: u64,
    pub initial_delay_ms: u64,
    /// Extra ticks on top of the estimate before giving up
    pub attempt_buffer: u32,
    pub timeout_policy: TimeoutPolicy,
}

/// Realtime notifier behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Persistent transports are not available; kept for parity with deployments that set it
    pub persistent_connections_enabled: bool,
    /// Offsets of the scripted progress steps after a progress request
    pub scripted_step_offsets_ms: Vec<u64>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; `logs/` next to the executable when unset
    pub directory: Option<PathBuf>,

    pub file_name: String,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            progress: ProgressConfig::default(),
            polling: PollingConfig::default(),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            submit_path: defaults::SUBMIT_PATH.to_string(),
            status_path: defaults::STATUS_PATH.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: format!("mealplan-progress/{}", env!("CARGO_PKG_VERSION")),
            token_file: None,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: GenerationMode::default(),
            fast: ModeTiming {
                seconds_per_unit: defaults::FAST_SECONDS_PER_UNIT,
                floor_seconds: defaults::FAST_FLOOR_SECONDS,
            },
            standard: ModeTiming {
                seconds_per_unit: defaults::STANDARD_SECONDS_PER_UNIT,
                floor_seconds: defaults::STANDARD_FLOOR_SECONDS,
            },
            cap_percent: defaults::PROGRESS_CAP_PERCENT,
            jitter_max_percent: defaults::JITTER_MAX_PERCENT,
            phase_messages: defaults::PHASE_MESSAGES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            initial_delay_ms: defaults::INITIAL_DELAY_MS,
            attempt_buffer: defaults::ATTEMPT_BUFFER,
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            persistent_connections_enabled: false,
            scripted_step_offsets_ms: defaults::SCRIPTED_STEP_OFFSETS_MS.to_vec(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            directory: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl ProgressConfig {
    pub const fn timing(&self, mode: GenerationMode) -> ModeTiming {
        match mode {
            GenerationMode::Fast => self.fast,
            GenerationMode::Standard => self.standard,
        }
    }
}

impl PollingConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// `ceil(estimate / tick) + buffer`
    pub fn max_attempts(&self, estimated_seconds: u64) -> u32 {
        let tick_ms = self.tick_interval_ms.max(1);
        let ticks = estimated_seconds.saturating_mul(1000).div_ceil(tick_ms);
        u32::try_from(ticks).unwrap_or(u32::MAX).saturating_add(self.attempt_buffer)
    }
}

impl AppConfig {
    /// Defaults overlaid by one config file and the environment
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// `config/default` and `config/{env}` (both optional) plus environment
    pub fn for_environment(env: &str) -> Result<Self, ConfigError> {
        let env_path = format!("config/{env}");

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&env_path).required(false))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("MEALPLAN").separator("__")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.polling.tick_interval_ms == 0 {
            return fail("polling.tick_interval_ms must be greater than 0");
        }
        if !(50..=99).contains(&self.progress.cap_percent) {
            return fail("progress.cap_percent must be between 50 and 99");
        }
        if self.progress.jitter_max_percent >= self.progress.cap_percent {
            return fail("progress.jitter_max_percent must be below cap_percent");
        }
        for (name, timing) in [("fast", self.progress.fast), ("standard", self.progress.standard)] {
            if timing.seconds_per_unit == 0 || timing.floor_seconds == 0 {
                return Err(ConfigError::Validation {
                    message: format!("progress.{name} timing values must be greater than 0"),
                });
            }
        }
        if self.progress.phase_messages.is_empty() {
            return fail("progress.phase_messages must not be empty");
        }
        if self.notifier.scripted_step_offsets_ms.is_empty() {
            return fail("notifier.scripted_step_offsets_ms must not be empty");
        }
        if self.api.max_requests_per_second == 0 {
            return fail("api.max_requests_per_second must be greater than 0");
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(ConfigError::Validation {
                message: format!("api.base_url is not a valid URL: {}", self.api.base_url),
            });
        }

        Ok(())
    }
}

/// Per-user config file management
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::APP_DIR_NAME))
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(defaults::APP_DIR_NAME))
    }

    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = Self::get_config_dir().ok_or_else(|| ConfigError::Validation {
            message: "no user config directory on this platform".to_string(),
        })?;
        Ok(Self::with_path(config_dir.join(defaults::CONFIG_FILE_NAME)))
    }

    pub const fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load the user file (plus environment), writing defaults on first run
    pub async fn load_config(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.as_path()))
            .add_source(AppConfig::environment())
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| io_error(parent, source))?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, content)
            .await
            .map_err(|source| io_error(&self.config_path, source))?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Default values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "mealplan-progress";
    pub const CONFIG_FILE_NAME: &str = "mealplan_config.json";

    pub const API_BASE_URL: &str = "http://localhost:8000/api";
    pub const SUBMIT_PATH: &str = "/meal-plans/generate/";
    pub const STATUS_PATH: &str = "/meal-plans";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;

    pub const FAST_SECONDS_PER_UNIT: u64 = 2;
    pub const FAST_FLOOR_SECONDS: u64 = 30;
    pub const STANDARD_SECONDS_PER_UNIT: u64 = 8;
    pub const STANDARD_FLOOR_SECONDS: u64 = 120;

    pub const PROGRESS_CAP_PERCENT: u8 = 88;
    pub const JITTER_MAX_PERCENT: u8 = 3;

    pub const PHASE_MESSAGES: &[&str] = &[
        "Analyzing your preferences...",
        "Finding recipes that match your goals...",
        "Balancing nutrition across the week...",
        "Selecting recipes for each meal...",
        "Building your shopping list...",
        "Finalizing your meal plan...",
    ];

    pub const TICK_INTERVAL_MS: u64 = 3000;
    pub const INITIAL_DELAY_MS: u64 = 2000;
    pub const ATTEMPT_BUFFER: u32 = 10;

    pub const SCRIPTED_STEP_OFFSETS_MS: &[u64] = &[500, 2000, 4000, 6000, 8000];

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "mealplan-progress.log";
}

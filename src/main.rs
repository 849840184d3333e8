//! Runner: submit one generation request and follow it to the end
//!
//! ```bash
//! mealplan-progress request.json
//! MEALPLAN__PROGRESS__MODE=standard mealplan-progress request.json
//! ```

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use mealplan_progress_lib::application::{ChannelSink, JobOutcome, MealPlanService};
use mealplan_progress_lib::domain::GenerationRequest;
use mealplan_progress_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use mealplan_progress_lib::infrastructure::{
    ApiClient, AppConfig, ConfigManager, FileTokenStore, HttpMealPlanBackend, TokenStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let Some(request_path) = std::env::args().nth(1) else {
        bail!("usage: mealplan-progress <request.json>");
    };

    let config = load_config().await?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let content = tokio::fs::read_to_string(&request_path)
        .await
        .with_context(|| format!("Failed to read {request_path}"))?;
    let request: GenerationRequest =
        serde_json::from_str(&content).with_context(|| format!("Invalid request in {request_path}"))?;

    let token_path = match &config.api.token_file {
        Some(path) => path.clone(),
        None => FileTokenStore::default_path().context("No data directory for the token file")?,
    };
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(token_path)?);
    let client = Arc::new(ApiClient::new(config.api.clone(), tokens)?);

    let mut session_events = client.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            warn!("Session event: {:?}", event);
        }
    });

    let service = MealPlanService::new(Arc::new(HttpMealPlanBackend::new(client)), config);
    let (tx, mut snapshots) = mpsc::unbounded_channel();
    let handle = service.generate(request, Arc::new(ChannelSink(tx)))?;

    let printer = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            println!("[{:>3}%] {}", snapshot.percent, snapshot.message);
        }
    });

    let report = handle
        .wait_or_cancel(async {
            // a failed signal listener just means Ctrl-C cannot interrupt us
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
            } else {
                std::future::pending::<()>().await;
            }
        })
        .await;
    // the poller task owned the only sender, so the printer drains and ends
    printer.await.context("Snapshot printer failed")?;

    match report.outcome {
        JobOutcome::Completed => {
            if let Some(plan) = report.into_snapshot()?.extra.meal_plan {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            }
            Ok(())
        }
        JobOutcome::TimedOut => {
            let snapshot = report.into_snapshot()?;
            if snapshot.extra.completed {
                info!("Tracking timed out, the plan is most likely ready");
                Ok(())
            } else {
                bail!("Meal plan generation timed out")
            }
        }
        JobOutcome::Failed => bail!("Meal plan generation failed"),
        JobOutcome::Cancelled => bail!("Meal plan tracking was cancelled"),
    }
}

/// `MEALPLAN_ENV` selects `config/{env}`; otherwise the per-user file, created on first run
async fn load_config() -> Result<AppConfig> {
    if let Ok(env) = std::env::var("MEALPLAN_ENV") {
        return AppConfig::for_environment(&env).with_context(|| format!("Failed to load {env} configuration"));
    }
    let manager = ConfigManager::new()?;
    Ok(manager.load_config().await?)
}

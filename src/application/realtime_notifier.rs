//! "Live connection" facade for progress consumers
//!
//! No persistent transport is compiled in. `connect` always settles on a
//! simulated connection, and a progress request is answered with scripted
//! steps computed by a [`ProgressEstimator`], so the messages follow the
//! same curve as the poller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress_estimator::ProgressEstimator;
use crate::domain::{JobEstimate, JobId, NotifierMessage, NotifierMessageKind, OutboundEvent, UserContext};
use crate::infrastructure::config::{NotifierConfig, ProgressConfig};
use crate::infrastructure::error::NotifierError;

/// Meals per day is not part of a progress request
const ASSUMED_MEALS_PER_DAY: u32 = 3;

/// Connection lifecycle. With the simulated connection `Connecting` is
/// momentary: `connect` passes through it under the state lock, so callers
/// only ever observe `Connected` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

struct NotifierState {
    connection: ConnectionState,
    /// Bumped on disconnect and on every new schedule; stale steps compare against it
    epoch: u64,
    steps: CancellationToken,
}

pub struct RealtimeNotifier {
    config: NotifierConfig,
    progress: ProgressConfig,
    state: Arc<Mutex<NotifierState>>,
    messages: Arc<watch::Sender<Option<NotifierMessage>>>,
}

impl RealtimeNotifier {
    pub fn new(config: NotifierConfig, progress: ProgressConfig) -> Self {
        let (messages, _) = watch::channel(None);
        Self {
            config,
            progress,
            state: Arc::new(Mutex::new(NotifierState {
                connection: ConnectionState::Idle,
                epoch: 0,
                steps: CancellationToken::new(),
            })),
            messages: Arc::new(messages),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn last_message(&self) -> Option<NotifierMessage> {
        self.messages.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<NotifierMessage>> {
        self.messages.subscribe()
    }

    /// Settle on a simulated connection
    pub fn connect(&self, user: Option<&UserContext>) {
        let mut state = self.lock();
        if state.connection == ConnectionState::Connected {
            return;
        }
        state.connection = ConnectionState::Connecting;

        match user {
            None => debug!("No signed-in user, using simulated progress connection"),
            Some(user) if self.config.persistent_connections_enabled => warn!(
                user_id = %user.user_id,
                "Persistent connections requested but no transport is available, simulating"
            ),
            Some(user) => debug!(user_id = %user.user_id, "Persistent connections disabled, simulating"),
        }

        state.connection = ConnectionState::Connected;
        info!("🔌 Progress notifier connected");
    }

    /// Drop scheduled steps and the last message. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.steps.cancel();
        state.steps = CancellationToken::new();
        self.messages.send_replace(None);

        if matches!(state.connection, ConnectionState::Connecting | ConnectionState::Connected) {
            state.connection = ConnectionState::Disconnected;
            info!("Progress notifier disconnected");
        }
    }

    /// Handle a consumer event. Must be called from within a tokio runtime.
    pub fn send_message(&self, event: OutboundEvent) -> Result<(), NotifierError> {
        let mut state = self.lock();
        if state.connection != ConnectionState::Connected {
            return Err(NotifierError::NotConnected);
        }

        match event {
            OutboundEvent::RequestProgress { meal_plan_id, total_meals } => {
                // a new request replaces whatever was still scheduled
                state.epoch += 1;
                state.steps.cancel();
                state.steps = CancellationToken::new();

                let steps = self.scripted_steps(&meal_plan_id, total_meals);
                debug!(job_id = %meal_plan_id, steps = steps.len(), "Scheduling scripted progress");
                self.schedule(steps, state.epoch, state.steps.clone());
            }
            OutboundEvent::Ping => debug!("Ignoring ping on simulated connection"),
        }
        Ok(())
    }

    /// Step `i` of `n` lands at `(i + 1) / n` of the estimate, so the last one reaches the cap
    fn scripted_steps(&self, meal_plan_id: &JobId, total_meals: u32) -> Vec<(Duration, NotifierMessage)> {
        let timing = self.progress.timing(self.progress.mode);
        let estimate = JobEstimate::for_units(total_meals, ASSUMED_MEALS_PER_DAY, timing);
        let mut estimator = ProgressEstimator::new(meal_plan_id.clone(), estimate, &self.progress);

        let offsets = &self.config.scripted_step_offsets_ms;
        let count = offsets.len() as f64;
        offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let elapsed = estimate.estimated_secs_f64() * (i as f64 + 1.0) / count;
                let snapshot = estimator.observe(elapsed, None);
                let message = NotifierMessage {
                    kind: NotifierMessageKind::MealPlanProgress,
                    meal_plan_id: Some(meal_plan_id.clone()),
                    progress: snapshot.percent,
                    current_step: snapshot.message,
                    total_meals: snapshot.total_units,
                    completed_meals: snapshot.completed_units,
                };
                (Duration::from_millis(*offset), message)
            })
            .collect()
    }

    fn schedule(&self, steps: Vec<(Duration, NotifierMessage)>, epoch: u64, cancel: CancellationToken) {
        let state = Arc::clone(&self.state);
        let messages = Arc::clone(&self.messages);
        let start = Instant::now();

        tokio::spawn(async move {
            for (offset, message) in steps {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep_until(start + offset) => {}
                }
                let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.epoch != epoch {
                    return;
                }
                debug!(progress = message.progress, "Scripted progress step");
                messages.send_replace(Some(message));
            }
        });
    }
}

impl Drop for RealtimeNotifier {
    fn drop(&mut self) {
        self.lock().steps.cancel();
    }
}

//! Polling loop for one generation job
//!
//! One tokio task per job drives its [`ProgressEstimator`]: an initial delay,
//! then a fixed tick. Each tick asks the backend for the job status (unless
//! the id is still temporary), waiting at most one tick for the answer, and
//! emits a snapshot. The terminal snapshot therefore arrives no later than
//! `initial_delay + max_attempts * tick` after start. The loop ends on a
//! terminal status, on a `fail` command, when the attempt budget runs out,
//! or on cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress_estimator::ProgressEstimator;
use crate::domain::{GenerationJob, JobId, JobStatus, ProgressSnapshot};
use crate::infrastructure::config::PollingConfig;
use crate::infrastructure::error::MealPlanError;
use crate::infrastructure::meal_plan_api::MealPlanBackend;

/// Receives snapshots as the poller produces them
pub trait ProgressSink: Send + Sync + 'static {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}

/// Forwards snapshots into an unbounded channel
pub struct ChannelSink(pub mpsc::UnboundedSender<ProgressSnapshot>);

impl ProgressSink for ChannelSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // receiver gone means nobody is watching any more
        let _ = self.0.send(snapshot.clone());
    }
}

/// How tracking ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobOutcome {
    fn from_terminal(snapshot: &ProgressSnapshot) -> Self {
        if snapshot.extra.error {
            Self::Failed
        } else if snapshot.extra.timed_out {
            Self::TimedOut
        } else {
            Self::Completed
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub job_id: JobId,
    pub attempts: u32,
    pub last_snapshot: Option<ProgressSnapshot>,
}

impl JobReport {
    /// Terminal snapshot of a job that was not cancelled
    pub fn into_snapshot(self) -> Result<ProgressSnapshot, MealPlanError> {
        match (self.outcome, self.last_snapshot) {
            (JobOutcome::Cancelled, _) | (_, None) => Err(MealPlanError::Cancelled),
            (_, Some(snapshot)) => Ok(snapshot),
        }
    }

    fn detached() -> Self {
        Self {
            outcome: JobOutcome::Cancelled,
            job_id: JobId::new(""),
            attempts: 0,
            last_snapshot: None,
        }
    }
}

#[derive(Debug)]
enum PollerCommand {
    AssignId(JobId),
    Fail(String),
}

/// Cloneable control side of a running poller
#[derive(Debug, Clone)]
pub struct JobControl {
    tx: mpsc::UnboundedSender<PollerCommand>,
}

impl JobControl {
    /// Swap the temporary id for the server one; false once the poller is gone
    pub fn assign_id(&self, id: JobId) -> bool {
        self.tx.send(PollerCommand::AssignId(id)).is_ok()
    }

    /// End the job with a terminal error snapshot
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx.send(PollerCommand::Fail(reason.into())).is_ok()
    }
}

/// Serializes sink calls against cancellation.
///
/// Once `close` returns, no snapshot reaches the sink. Closing from inside
/// the sink callback is allowed and does not wait on itself.
struct EmitGate {
    sink: Arc<dyn ProgressSink>,
    closed: AtomicBool,
    emitting: Mutex<()>,
    emitter: Mutex<Option<ThreadId>>,
}

impl EmitGate {
    fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            closed: AtomicBool::new(false),
            emitting: Mutex::new(()),
            emitter: Mutex::new(None),
        }
    }

    fn emit(&self, snapshot: &ProgressSnapshot) -> bool {
        let _guard = self.emitting.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        *self.emitter.lock().unwrap_or_else(PoisonError::into_inner) = Some(std::thread::current().id());
        self.sink.on_progress(snapshot);
        *self.emitter.lock().unwrap_or_else(PoisonError::into_inner) = None;
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let current = std::thread::current().id();
        if *self.emitter.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            return;
        }
        // wait out an emission already running on another thread
        drop(self.emitting.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Owner handle for a running poller; dropping it cancels tracking
pub struct JobHandle {
    gate: Arc<EmitGate>,
    cancel: CancellationToken,
    control: JobControl,
    status: watch::Receiver<JobStatus>,
    task: Option<JoinHandle<JobReport>>,
}

impl JobHandle {
    pub fn control(&self) -> JobControl {
        self.control.clone()
    }

    /// Latest authoritative status seen by the poller
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop tracking. No snapshot is delivered after this returns.
    pub fn cancel(&self) {
        self.gate.close();
        self.cancel.cancel();
    }

    /// Wait for the loop to end
    pub async fn wait(self) -> JobReport {
        self.wait_or_cancel(std::future::pending::<()>()).await
    }

    /// Wait for the loop to end, cancelling it first if `shutdown` resolves.
    /// Dropping the returned future before it completes also cancels.
    pub async fn wait_or_cancel<F: Future>(mut self, shutdown: F) -> JobReport {
        let Some(task) = self.task.as_mut() else {
            return JobReport::detached();
        };
        let finished = tokio::select! {
            joined = task => Some(joined),
            _ = shutdown => None,
        };
        let joined = match finished {
            Some(joined) => joined,
            None => {
                self.cancel();
                match self.task.as_mut() {
                    Some(task) => task.await,
                    None => return JobReport::detached(),
                }
            }
        };
        self.task = None;

        match joined {
            Ok(report) => report,
            Err(e) => {
                warn!("Generation poller task ended abnormally: {}", e);
                JobReport::detached()
            }
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.cancel();
        }
    }
}

pub struct GenerationPoller {
    job: GenerationJob,
    backend: Arc<dyn MealPlanBackend>,
    config: PollingConfig,
    estimator: ProgressEstimator,
    gate: Arc<EmitGate>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<PollerCommand>,
    status_tx: watch::Sender<JobStatus>,
    max_attempts: u32,
    attempts: u32,
    last_snapshot: Option<ProgressSnapshot>,
}

impl GenerationPoller {
    /// Start tracking `job` on the current tokio runtime
    pub fn spawn(
        job: GenerationJob,
        backend: Arc<dyn MealPlanBackend>,
        config: PollingConfig,
        estimator: ProgressEstimator,
        sink: Arc<dyn ProgressSink>,
    ) -> JobHandle {
        let gate = Arc::new(EmitGate::new(sink));
        let cancel = CancellationToken::new();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(job.status);
        let max_attempts = config.max_attempts(job.estimated_seconds());

        info!(
            job_id = %job.id,
            estimated_seconds = job.estimated_seconds(),
            max_attempts,
            "🚀 Tracking meal plan generation"
        );

        let poller = Self {
            job,
            backend,
            config,
            estimator,
            gate: Arc::clone(&gate),
            cancel: cancel.clone(),
            commands,
            status_tx,
            max_attempts,
            attempts: 0,
            last_snapshot: None,
        };
        let task = tokio::spawn(poller.run());

        JobHandle {
            gate,
            cancel,
            control: JobControl { tx: command_tx },
            status,
            task: Some(task),
        }
    }

    async fn run(mut self) -> JobReport {
        let started = Instant::now();

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return self.finish(JobOutcome::Cancelled),
            () = tokio::time::sleep(self.config.initial_delay()) => {}
        }

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.finish(JobOutcome::Cancelled),
                Some(command) = self.commands.recv() => {
                    if let Some(outcome) = self.apply(command, started) {
                        return self.finish(outcome);
                    }
                }
                _ = ticker.tick() => {
                    if let Some(outcome) = self.tick(started).await {
                        return self.finish(outcome);
                    }
                }
            }
        }
    }

    fn apply(&mut self, command: PollerCommand, started: Instant) -> Option<JobOutcome> {
        match command {
            PollerCommand::AssignId(id) => {
                if id.is_temporary() {
                    warn!(job_id = %self.job.id, new_id = %id, "Ignoring temporary id assignment");
                    return None;
                }
                info!(job_id = %self.job.id, new_id = %id, "Job id assigned by backend");
                self.estimator.rebind(id.clone());
                self.job.id = id;
                None
            }
            PollerCommand::Fail(reason) => {
                warn!(job_id = %self.job.id, "Meal plan generation failed: {}", reason);
                self.set_status(JobStatus::Failed);
                let snapshot = self.estimator.failed(started.elapsed().as_secs_f64(), Some(&reason));
                self.emit(snapshot);
                Some(JobOutcome::Failed)
            }
        }
    }

    async fn tick(&mut self, started: Instant) -> Option<JobOutcome> {
        self.attempts += 1;

        let report = if self.job.id.is_temporary() {
            debug!(job_id = %self.job.id, attempt = self.attempts, "Temporary id, using time-based progress");
            None
        } else {
            // a poll never outlives its tick; an unanswered one counts as a failed attempt
            let fetch = tokio::time::timeout(self.config.tick_interval(), self.backend.fetch_status(&self.job.id));
            let fetched = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Some(JobOutcome::Cancelled),
                fetched = fetch => fetched,
            };
            match fetched {
                Err(_) => {
                    warn!(
                        job_id = %self.job.id,
                        attempt = self.attempts,
                        "Status poll got no answer within {:?}",
                        self.config.tick_interval()
                    );
                    None
                }
                Ok(Ok(report)) => {
                    debug!(job_id = %self.job.id, attempt = self.attempts, status = %report.status, "Status poll");
                    self.set_status(report.status);
                    Some(report)
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(job_id = %self.job.id, attempt = self.attempts, "Status poll failed: {}", e);
                    None
                }
                Ok(Err(e)) => {
                    debug!(job_id = %self.job.id, attempt = self.attempts, "Status unavailable: {}", e);
                    None
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        let terminal = report.as_ref().is_some_and(|r| r.status.is_terminal());

        if !terminal && self.attempts >= self.max_attempts {
            warn!(
                job_id = %self.job.id,
                attempts = self.attempts,
                policy = ?self.config.timeout_policy,
                "⏰ Attempt budget exhausted before the backend finished"
            );
            let snapshot = self.estimator.timed_out(elapsed, self.config.timeout_policy);
            self.emit(snapshot);
            return Some(JobOutcome::TimedOut);
        }

        let snapshot = self.estimator.observe(elapsed, report.as_ref());
        let outcome = snapshot.is_terminal().then(|| JobOutcome::from_terminal(&snapshot));
        self.emit(snapshot);
        outcome
    }

    fn set_status(&mut self, status: JobStatus) {
        self.job.status = status;
        self.status_tx.send_replace(status);
    }

    fn emit(&mut self, snapshot: ProgressSnapshot) {
        if self.gate.emit(&snapshot) {
            self.last_snapshot = Some(snapshot);
        }
    }

    fn finish(self, outcome: JobOutcome) -> JobReport {
        match outcome {
            JobOutcome::Completed => info!(job_id = %self.job.id, attempts = self.attempts, "✅ Meal plan generation completed"),
            JobOutcome::Failed => warn!(job_id = %self.job.id, attempts = self.attempts, "❌ Meal plan generation failed"),
            JobOutcome::TimedOut => warn!(job_id = %self.job.id, attempts = self.attempts, "Meal plan tracking timed out"),
            JobOutcome::Cancelled => debug!(job_id = %self.job.id, attempts = self.attempts, "🛑 Meal plan tracking cancelled"),
        }
        JobReport {
            outcome,
            job_id: self.job.id,
            attempts: self.attempts,
            last_snapshot: self.last_snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: JobId::new("mp-1"),
            percent: 10,
            message: String::new(),
            completed_units: 0,
            total_units: 21,
            elapsed_seconds: 1.0,
            extra: Default::default(),
        }
    }

    #[test]
    fn closed_gate_drops_snapshots() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let gate = EmitGate::new(Arc::new(move |_: &ProgressSnapshot| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(gate.emit(&snapshot()));
        gate.close();
        assert!(!gate.emit(&snapshot()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_can_close_from_inside_the_sink() {
        let gate_slot: Arc<Mutex<Option<Arc<EmitGate>>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&gate_slot);
        let gate = Arc::new(EmitGate::new(Arc::new(move |_: &ProgressSnapshot| {
            if let Some(gate) = slot.lock().unwrap().as_ref() {
                gate.close();
            }
        })));
        *gate_slot.lock().unwrap() = Some(Arc::clone(&gate));

        assert!(gate.emit(&snapshot()));
        assert!(!gate.emit(&snapshot()));
        gate_slot.lock().unwrap().take();
    }
}

//! Single-run cleanup runner.
//!
//! Owns the one run handle of the process: at most one cleanup runs at a
//! time, progress is published to a shared [`RunState`] for polling and to a
//! broadcast channel of [`RunEvent`]s.

use std::sync::{Arc, RwLock, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};
use uuid::Uuid;

use strata_core::defaults::{EVENT_BUS_CAPACITY, RUN_LOG_CAPACITY};
use strata_core::{Error, Result, RunConfig, RunSummary};

use crate::context::{ProgressSink, RunContext};
use crate::pipeline::CleanupPipeline;
use crate::state::{RunEvent, RunState, RunStatus};

const RUN_PANICKED: &str = "cleanup run panicked";

/// Write access that survives a run task panicking mid-update.
fn write_state(state: &RwLock<RunState>) -> RwLockWriteGuard<'_, RunState> {
    state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts cleanup runs in the background and reports on them.
#[derive(Clone)]
pub struct CleanupRunner {
    pipeline: Arc<CleanupPipeline>,
    state: Arc<RwLock<RunState>>,
    event_tx: broadcast::Sender<RunEvent>,
    extra_sink: Option<ProgressSink>,
    log_capacity: usize,
}

impl CleanupRunner {
    pub fn new(pipeline: CleanupPipeline) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            pipeline: Arc::new(pipeline),
            state: Arc::new(RwLock::new(RunState::default())),
            event_tx,
            extra_sink: None,
            log_capacity: RUN_LOG_CAPACITY,
        }
    }

    /// Add a progress sink called for every step message of every run.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, u8) + Send + Sync + 'static,
    {
        self.extra_sink = Some(Arc::new(callback));
        self
    }

    /// Number of progress lines kept in [`RunState::log`].
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Get a receiver for run events.
    pub fn events(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// Clone of the current (or last) run state.
    pub fn status(&self) -> RunState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Dry run: analyze without mutating. Allowed while a run is active.
    pub async fn analyze(&self, config: RunConfig) -> Result<RunSummary> {
        config.validate()?;
        self.pipeline.analyze(config).await
    }

    /// Validate `config` and start a run in the background.
    ///
    /// Returns the new run id, or `Error::Conflict` when a run is in progress.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "runner"))]
    pub fn start(&self, config: RunConfig) -> Result<Uuid> {
        config.validate()?;
        let run_id = Uuid::now_v7();

        {
            let mut state = write_state(&self.state);
            if state.is_running() {
                return Err(Error::Conflict(format!(
                    "cleanup run {} is already in progress",
                    state.run_id.map(|id| id.to_string()).unwrap_or_default()
                )));
            }
            *state = RunState::starting(run_id);
        }

        info!(run_id = %run_id, min_post_threshold = config.min_post_threshold, dry_run = config.dry_run, "Cleanup run started");
        let _ = self.event_tx.send(RunEvent::Started { run_id });

        let mut ctx = RunContext::new(run_id, config).with_progress_sink(self.state_sink(run_id));
        if let Some(sink) = &self.extra_sink {
            ctx = ctx.with_progress_sink(sink.clone());
        }

        let pipeline = self.pipeline.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        let run = tokio::spawn(async move {
            let result = pipeline.run(&mut ctx).await;
            let event = match result {
                Ok(summary) => {
                    info!(run_id = %run_id, item_errors = summary.item_errors, "Cleanup run completed");
                    let mut state = write_state(&state);
                    state.status = RunStatus::Completed;
                    state.percent = 100;
                    state.finished_at = Some(Utc::now());
                    state.summary = Some(summary.clone());
                    RunEvent::Completed { run_id, summary }
                }
                Err(e) => {
                    let step = ctx.step().key().to_string();
                    error!(run_id = %run_id, step = %step, error = %e, "Cleanup run failed");
                    let mut state = write_state(&state);
                    state.status = RunStatus::Failed;
                    state.finished_at = Some(Utc::now());
                    state.step = Some(step.clone());
                    state.error = Some(e.to_string());
                    state.summary = Some(ctx.summary.clone());
                    RunEvent::Failed {
                        run_id,
                        step: Some(step),
                        error: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event);
        });

        // A panicking run never reaches its own terminal update.
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let Err(join_error) = run.await else {
                return;
            };
            let step = {
                let mut state = write_state(&state);
                if !state.is_running() || state.run_id != Some(run_id) {
                    return;
                }
                state.status = RunStatus::Failed;
                state.finished_at = Some(Utc::now());
                state.error = Some(RUN_PANICKED.to_string());
                state.step.clone()
            };
            error!(run_id = %run_id, step = step.as_deref().unwrap_or("unknown"), error = %join_error, "Cleanup run aborted");
            let _ = event_tx.send(RunEvent::Failed {
                run_id,
                step,
                error: RUN_PANICKED.to_string(),
            });
        });

        Ok(run_id)
    }

    /// Sink that mirrors progress into the shared state and the event bus.
    fn state_sink(&self, run_id: Uuid) -> ProgressSink {
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        let capacity = self.log_capacity;
        Arc::new(move |step: &str, message: &str, percent: u8| {
            write_state(&state).push_progress(step, message, percent, capacity);
            let _ = event_tx.send(RunEvent::Progress {
                run_id,
                step: step.to_string(),
                message: message.to_string(),
                percent,
            });
        })
    }
}

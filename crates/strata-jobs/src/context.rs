//! Per-run context passed to every pipeline step.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use strata_core::{Error, RunConfig, RunSummary};

use crate::state::CleanupStep;

/// Progress callback: `(step_key, message, percent)`.
pub type ProgressSink = Arc<dyn Fn(&str, &str, u8) + Send + Sync>;

/// Explicit state of one cleanup run.
///
/// Owns the run's configuration, the counters that become the
/// [`RunSummary`], and the progress sinks. Steps receive it by `&mut`.
pub struct RunContext {
    pub run_id: Uuid,
    pub config: RunConfig,
    pub summary: RunSummary,
    step: CleanupStep,
    sinks: Vec<ProgressSink>,
}

impl RunContext {
    pub fn new(run_id: Uuid, config: RunConfig) -> Self {
        let summary = RunSummary {
            dry_run: config.dry_run,
            ..RunSummary::default()
        };
        Self {
            run_id,
            config,
            summary,
            step: CleanupStep::Analyze,
            sinks: Vec::new(),
        }
    }

    /// Add a progress sink. Sinks are fire-and-forget.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, u8) + Send + Sync + 'static,
    {
        self.sinks.push(Arc::new(callback));
        self
    }

    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Step currently executing.
    pub fn step(&self) -> CleanupStep {
        self.step
    }

    /// Move to `step` and announce it.
    pub fn enter(&mut self, step: CleanupStep) {
        self.step = step;
        info!(
            subsystem = "jobs",
            component = "pipeline",
            run_id = %self.run_id,
            step = step.key(),
            percent = step.percent(),
            "{}",
            step.message()
        );
        self.report(step.message());
    }

    /// Report a progress line for the current step.
    pub fn note(&self, message: &str) {
        info!(
            subsystem = "jobs",
            component = "pipeline",
            run_id = %self.run_id,
            step = self.step.key(),
            "{}",
            message
        );
        self.report(message);
    }

    fn report(&self, message: &str) {
        for sink in &self.sinks {
            sink(self.step.key(), message, self.step.percent());
        }
    }

    /// Log and count a per-item failure. The run continues.
    pub fn item_failed(&mut self, op: &str, item: impl std::fmt::Display, error: &Error) {
        self.summary.item_errors += 1;
        warn!(
            subsystem = "jobs",
            component = "pipeline",
            run_id = %self.run_id,
            step = self.step.key(),
            op,
            item = %item,
            error = %error,
            "Item failed, skipping"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_sink_receives_step_and_percent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut ctx = RunContext::new(Uuid::now_v7(), RunConfig::default()).with_progress_callback(
            move |step, message, percent| {
                sink_seen
                    .lock()
                    .unwrap()
                    .push((step.to_string(), message.to_string(), percent));
            },
        );

        ctx.enter(CleanupStep::Backup);
        ctx.note("wrote backup");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "backup");
        assert_eq!(seen[0].2, CleanupStep::Backup.percent());
        assert_eq!(seen[1].1, "wrote backup");
    }

    #[test]
    fn test_no_sink_is_fine() {
        let mut ctx = RunContext::new(Uuid::now_v7(), RunConfig::default());
        ctx.enter(CleanupStep::Analyze);
        ctx.note("nothing listens");
        assert_eq!(ctx.step(), CleanupStep::Analyze);
    }

    #[test]
    fn test_item_failures_are_counted() {
        let mut ctx = RunContext::new(Uuid::now_v7(), RunConfig::default());
        ctx.item_failed("soft_delete", "abc", &Error::Internal("boom".into()));
        ctx.item_failed("soft_delete", "def", &Error::Internal("boom".into()));
        assert_eq!(ctx.summary.item_errors, 2);
    }

    #[test]
    fn test_dry_run_flag_carried_into_summary() {
        let ctx = RunContext::new(Uuid::now_v7(), RunConfig::default().dry_run());
        assert!(ctx.summary.dry_run);
    }
}

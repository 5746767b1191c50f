//! Background runner: run lifecycle, status polling and the event stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use strata_core::{
    ClusterMergeResponse, ClusterSummary, Error, HierarchyProposal, Result, RunConfig,
    TaxonomyOracle,
};
use strata_db::InMemoryCategoryStore;
use strata_inference::mock::{MockEmbeddingBackend, ScriptedOracle};
use strata_inference::RetryPolicy;
use strata_jobs::{CleanupPipeline, CleanupRunner, PipelineConfig, RunEvent, RunStatus};
use tempfile::TempDir;

/// Oracle that holds the merge call until the test releases it.
struct GatedOracle {
    gate: Arc<Notify>,
}

#[async_trait]
impl TaxonomyOracle for GatedOracle {
    async fn merge_similar_clusters(
        &self,
        _clusters: &[ClusterSummary],
    ) -> Result<ClusterMergeResponse> {
        self.gate.notified().await;
        Ok(ClusterMergeResponse::default())
    }

    async fn create_category_hierarchy(
        &self,
        _category_names: &[String],
    ) -> Result<HierarchyProposal> {
        Ok(HierarchyProposal::default())
    }
}

/// Oracle whose merge call panics.
struct PanickingOracle;

#[async_trait]
impl TaxonomyOracle for PanickingOracle {
    async fn merge_similar_clusters(
        &self,
        _clusters: &[ClusterSummary],
    ) -> Result<ClusterMergeResponse> {
        panic!("merge exploded");
    }

    async fn create_category_hierarchy(
        &self,
        _category_names: &[String],
    ) -> Result<HierarchyProposal> {
        Ok(HierarchyProposal::default())
    }
}

async fn seeded_store() -> InMemoryCategoryStore {
    let store = InMemoryCategoryStore::new();
    let small = store.add_category("tiny").await;
    let travel = store.add_category("travel").await;
    store.add_posts(small, 1).await;
    store.add_posts(travel, 4).await;
    store
}

fn runner(
    store: &InMemoryCategoryStore,
    oracle: Arc<dyn TaxonomyOracle>,
    backups: &TempDir,
) -> CleanupRunner {
    let pipeline = CleanupPipeline::new(
        Arc::new(store.clone()),
        Arc::new(MockEmbeddingBackend::new(2)),
        oracle,
    )
    .with_config(
        PipelineConfig::default()
            .with_backup_dir(backups.path())
            .with_retry(RetryPolicy::none()),
    );
    CleanupRunner::new(pipeline)
}

/// Receive events for `run_id` until the terminal one.
async fn wait_for_end(events: &mut broadcast::Receiver<RunEvent>, run_id: Uuid) -> RunEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.run_id() == run_id && event.is_terminal() => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("run did not finish in time")
}

#[tokio::test]
async fn test_run_completes_and_reports_status() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let runner = runner(&store, Arc::new(ScriptedOracle::new()), &backups);
    assert_eq!(runner.status().status, RunStatus::Idle);

    let mut events = runner.events();
    let run_id = runner.start(RunConfig::new(2)).unwrap();

    match wait_for_end(&mut events, run_id).await {
        RunEvent::Completed { summary, .. } => {
            assert_eq!(summary.deleted, 1);
            assert_eq!(summary.casing_renamed, 1);
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }

    let state = runner.status();
    assert_eq!(state.run_id, Some(run_id));
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.percent, 100);
    assert!(state.finished_at.is_some());
    assert_eq!(state.summary.as_ref().map(|s| s.remaining), Some(1));
    assert!(state.log.iter().any(|line| line.starts_with("[backup]")));
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_second_start_conflicts_while_running() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let gate = Arc::new(Notify::new());
    let runner = runner(
        &store,
        Arc::new(GatedOracle { gate: gate.clone() }),
        &backups,
    );

    let mut events = runner.events();
    let run_id = runner.start(RunConfig::new(2)).unwrap();
    assert!(runner.status().is_running());

    let err = runner.start(RunConfig::new(2)).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // A dry run is still allowed and leaves the active run alone.
    let preview = runner.analyze(RunConfig::new(2)).await.unwrap();
    assert!(preview.dry_run);
    assert_eq!(runner.status().run_id, Some(run_id));

    gate.notify_one();
    let end = wait_for_end(&mut events, run_id).await;
    assert!(matches!(end, RunEvent::Completed { .. }));

    // Finished runs free the slot.
    let next = runner.start(RunConfig::new(2)).unwrap();
    assert_ne!(next, run_id);
    gate.notify_one();
    wait_for_end(&mut events, next).await;
}

#[tokio::test]
async fn test_failed_run_records_step_and_error() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let runner = runner(
        &store,
        Arc::new(ScriptedOracle::new().failing_merges()),
        &backups,
    );

    let mut events = runner.events();
    let run_id = runner.start(RunConfig::new(2)).unwrap();

    match wait_for_end(&mut events, run_id).await {
        RunEvent::Failed { step, error, .. } => {
            assert_eq!(step.as_deref(), Some("oracle_merge_clusters"));
            assert!(error.contains("scripted merge failure"));
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }

    let state = runner.status();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.step.as_deref(), Some("oracle_merge_clusters"));
    assert!(state.error.is_some());
    // Work done before the failure is reported.
    assert_eq!(state.summary.as_ref().map(|s| s.deleted), Some(1));
}

#[tokio::test]
async fn test_panicking_run_is_marked_failed() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let runner = runner(&store, Arc::new(PanickingOracle), &backups);

    let mut events = runner.events();
    let run_id = runner.start(RunConfig::new(2)).unwrap();

    match wait_for_end(&mut events, run_id).await {
        RunEvent::Failed { step, error, .. } => {
            assert_eq!(step.as_deref(), Some("oracle_merge_clusters"));
            assert_eq!(error, "cleanup run panicked");
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }

    let state = runner.status();
    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.finished_at.is_some());
    assert!(!state.is_running());

    // The slot is free again.
    let next = runner.start(RunConfig::new(2)).unwrap();
    assert_ne!(next, run_id);
    wait_for_end(&mut events, next).await;
}

#[tokio::test]
async fn test_invalid_config_never_starts() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let runner = runner(&store, Arc::new(ScriptedOracle::new()), &backups);

    let err = runner.start(RunConfig::new(-5)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(runner.status().status, RunStatus::Idle);
    assert!(runner.status().run_id.is_none());
    assert_eq!(std::fs::read_dir(backups.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_analyze_leaves_status_untouched() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let runner = runner(&store, Arc::new(ScriptedOracle::new()), &backups);

    let summary = runner.analyze(RunConfig::new(2)).await.unwrap();
    assert_eq!(summary.to_delete, 1);
    assert_eq!(summary.to_keep, 1);
    assert_eq!(runner.status().status, RunStatus::Idle);
    assert!(store.find_by_name("tiny").await.is_some());
}

#[tokio::test]
async fn test_progress_callback_sees_every_run() {
    let backups = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let seen = Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
    let sink = seen.clone();
    let runner = runner(&store, Arc::new(ScriptedOracle::new()), &backups)
        .with_progress_callback(move |_, _, percent| sink.lock().unwrap().push(percent));

    let mut events = runner.events();
    let run_id = runner.start(RunConfig::new(2)).unwrap();
    wait_for_end(&mut events, run_id).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
}

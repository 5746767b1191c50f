//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use strata_api::{router, AppState};
use strata_core::{
    ClusterMergeResponse, ClusterSummary, HierarchyProposal, Result, TaxonomyOracle,
};
use strata_db::InMemoryCategoryStore;
use strata_inference::mock::{MockEmbeddingBackend, ScriptedOracle};
use strata_inference::RetryPolicy;
use strata_jobs::{CleanupPipeline, CleanupRunner, PipelineConfig, RunStatus};
use tempfile::TempDir;

struct TestApp {
    app: Router,
    runner: CleanupRunner,
    _backups: TempDir,
}

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

async fn test_app() -> TestApp {
    test_app_with_oracle(Arc::new(ScriptedOracle::new())).await
}

async fn test_app_with_oracle(oracle: Arc<dyn TaxonomyOracle>) -> TestApp {
    let backups = tempfile::tempdir().unwrap();
    let store = InMemoryCategoryStore::new();
    let small = store.add_category("tiny").await;
    let travel = store.add_category("Travel").await;
    store.add_posts(small, 1).await;
    store.add_posts(travel, 4).await;

    let pipeline = CleanupPipeline::new(
        Arc::new(store),
        Arc::new(MockEmbeddingBackend::new(2)),
        oracle,
    )
    .with_config(
        PipelineConfig::default()
            .with_backup_dir(backups.path())
            .with_retry(RetryPolicy::none()),
    );
    let runner = CleanupRunner::new(pipeline);
    TestApp {
        app: router(AppState::new(runner.clone())),
        runner,
        _backups: backups,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let t = test_app().await;
    let response = t.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_analyze_returns_dry_run_summary() {
    let t = test_app().await;
    let response = t
        .app
        .oneshot(post_json(
            "/api/v1/cleanup/analyze",
            serde_json::json!({ "minPostThreshold": 2 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["totalCategories"], 2);
    assert_eq!(body["toDelete"], 1);
    assert_eq!(body["dryRun"], true);
    assert_eq!(t.runner.status().status, RunStatus::Idle);
}

#[tokio::test]
async fn test_start_then_poll_status() {
    let t = test_app().await;
    let mut events = t.runner.events();

    let response = t
        .app
        .clone()
        .oneshot(post_json(
            "/api/v1/cleanup",
            serde_json::json!({ "minPostThreshold": 2, "reassignOrphans": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let run_id = json_body(response).await["runId"]
        .as_str()
        .unwrap()
        .to_string();

    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(event) = events.recv().await {
            if event.is_terminal() {
                break;
            }
        }
    })
    .await
    .unwrap();

    let response = t.app.oneshot(get("/api/v1/cleanup/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["runId"], run_id);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["percent"], 100);
    assert_eq!(body["summary"]["deleted"], 1);
}

#[tokio::test]
async fn test_negative_threshold_is_bad_request() {
    let t = test_app().await;
    let response = t
        .app
        .oneshot(post_json(
            "/api/v1/cleanup",
            serde_json::json!({ "minPostThreshold": -1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("minPostThreshold"));
}

#[tokio::test]
async fn test_second_start_is_conflict() {
    let gate = Arc::new(Notify::new());
    let t = test_app_with_oracle(Arc::new(GatedOracle { gate: gate.clone() })).await;
    let body = serde_json::json!({ "minPostThreshold": 2 });

    let first = t
        .app
        .clone()
        .oneshot(post_json("/api/v1/cleanup", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = t
        .app
        .oneshot(post_json("/api/v1/cleanup", body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(json_body(second).await["error"]
        .as_str()
        .unwrap()
        .contains("already in progress"));

    gate.notify_one();
}

//! strata-api - HTTP API server for taxonomy cleanup

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strata_api::{router, AppState};
use strata_core::CategoryStore;
use strata_db::{Database, InMemoryCategoryStore, PoolConfig};
use strata_inference::{LlmOracle, OllamaBackend};
use strata_jobs::{CleanupPipeline, CleanupRunner, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "strata=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "strata_api=debug,strata_jobs=debug,strata_inference=info,strata_db=info,tower_http=debug"
            .into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("strata-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    // Without DATABASE_URL the server runs against an empty in-memory store.
    let store: Arc<dyn CategoryStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            info!("Connecting to database...");
            let db = Database::connect_with_config(&database_url, &PoolConfig::from_env()).await?;
            db.migrate().await?;
            db.pool_status().log();
            info!("Database connected");
            Arc::new(db.categories)
        }
        Err(_) => {
            warn!("DATABASE_URL not set, using in-memory category store");
            Arc::new(InMemoryCategoryStore::new())
        }
    };

    let embedder = OllamaBackend::from_env();
    info!(
        model = %strata_core::EmbeddingBackend::model_name(&embedder),
        dimension = strata_core::EmbeddingBackend::dimension(&embedder),
        "Embedding backend configured"
    );
    let oracle = LlmOracle::new(OllamaBackend::from_env());

    let pipeline = CleanupPipeline::new(store, Arc::new(embedder), Arc::new(oracle))
        .with_config(PipelineConfig::from_env());
    info!(
        backup_dir = %pipeline.config().backup_dir.display(),
        similarity_threshold = pipeline.config().similarity_threshold,
        "Cleanup pipeline configured"
    );

    let app = router(AppState::new(CleanupRunner::new(pipeline)));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

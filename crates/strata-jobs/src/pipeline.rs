//! The cleanup pipeline: a strictly sequential state machine over the steps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};
use uuid::Uuid;

use strata_core::defaults::{
    BACKUP_DIR, CLUSTER_SIMILARITY_THRESHOLD, DELETE_BATCH_SIZE, EMBED_BATCH_SIZE,
    EMBED_MAX_RETRIES, EMBED_RETRY_BASE_MS, HASHTAG_BATCH_SIZE, MERGE_BATCH_SIZE,
    RENAME_BATCH_SIZE,
};
use strata_core::{
    CategoryStore, Cluster, EmbeddingBackend, Error, Result, RunConfig, RunSummary,
    TaxonomyOracle,
};
use strata_inference::RetryPolicy;

use crate::backup::write_backup;
use crate::context::RunContext;
use crate::state::CleanupStep;
use crate::steps;

/// Process-wide pipeline settings. Per-run settings live in [`RunConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cosine similarity needed to join a cluster seed.
    pub similarity_threshold: f32,
    pub hashtag_batch_size: usize,
    pub delete_batch_size: usize,
    pub rename_batch_size: usize,
    pub merge_batch_size: usize,
    pub embed_batch_size: usize,
    /// Directory receiving pre-mutation backups.
    pub backup_dir: PathBuf,
    /// Retry policy for embedding batches.
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: CLUSTER_SIMILARITY_THRESHOLD,
            hashtag_batch_size: HASHTAG_BATCH_SIZE,
            delete_batch_size: DELETE_BATCH_SIZE,
            rename_batch_size: RENAME_BATCH_SIZE,
            merge_batch_size: MERGE_BATCH_SIZE,
            embed_batch_size: EMBED_BATCH_SIZE,
            backup_dir: PathBuf::from(BACKUP_DIR),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `STRATA_BACKUP_DIR` | `./backups` | Where backups are written |
    /// | `STRATA_EMBED_MAX_RETRIES` | `3` | Retries per failed embedding batch |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("STRATA_BACKUP_DIR") {
            if !dir.trim().is_empty() {
                config.backup_dir = PathBuf::from(dir);
            }
        }

        let max_retries = std::env::var("STRATA_EMBED_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(EMBED_MAX_RETRIES);
        config.retry = RetryPolicy::new(max_retries, Duration::from_millis(EMBED_RETRY_BASE_MS));

        config
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use one batch size for every batched step. Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        let size = size.max(1);
        self.hashtag_batch_size = size;
        self.delete_batch_size = size;
        self.rename_batch_size = size;
        self.merge_batch_size = size;
        self.embed_batch_size = size;
        self
    }
}

/// Taxonomy consolidation over a store, an embedder and an oracle.
pub struct CleanupPipeline {
    store: Arc<dyn CategoryStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    oracle: Arc<dyn TaxonomyOracle>,
    config: PipelineConfig,
}

impl CleanupPipeline {
    pub fn new(
        store: Arc<dyn CategoryStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        oracle: Arc<dyn TaxonomyOracle>,
    ) -> Self {
        Self {
            store,
            embedder,
            oracle,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CategoryStore> {
        &self.store
    }

    /// Count what a run would do without mutating anything.
    pub async fn analyze(&self, config: RunConfig) -> Result<RunSummary> {
        let mut ctx = RunContext::new(Uuid::now_v7(), config.dry_run());
        self.run(&mut ctx).await
    }

    /// Execute every step in order and return the summary.
    ///
    /// Configuration errors are returned before anything is touched. Store
    /// failures on listings, backup failures and embedding or oracle
    /// failures abort the run, leaving earlier mutations in place; the
    /// partial counts stay in `ctx.summary`. Per-item failures are counted
    /// and skipped.
    #[instrument(skip_all, fields(subsystem = "jobs", component = "pipeline", run_id = %ctx.run_id, dry_run = ctx.config.dry_run))]
    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunSummary> {
        ctx.config.validate()?;
        if self.config.similarity_threshold.is_nan() {
            return Err(Error::Config("similarity threshold is NaN".to_string()));
        }
        let start = Instant::now();
        let store = self.store.as_ref();

        ctx.enter(CleanupStep::Analyze);
        let categories = store.list_categories().await?;
        let partition =
            steps::partition_by_threshold(categories, ctx.config.min_post_threshold);
        ctx.summary.total_categories = partition.to_keep.len() + partition.to_delete.len();
        ctx.summary.to_keep = partition.to_keep.len();
        ctx.summary.to_delete = partition.to_delete.len();
        ctx.note(&format!(
            "{} categories, {} to keep, {} below {} posts",
            ctx.summary.total_categories,
            ctx.summary.to_keep,
            ctx.summary.to_delete,
            ctx.config.min_post_threshold
        ));

        if ctx.config.dry_run {
            ctx.summary.remaining = ctx.summary.total_categories;
            ctx.enter(CleanupStep::Done);
            return Ok(ctx.summary.clone());
        }

        ctx.enter(CleanupStep::Backup);
        let path = write_backup(store, &self.config.backup_dir, ctx.run_id).await?;
        ctx.summary.backup_path = Some(path.display().to_string());
        ctx.note(&format!("Backup written to {}", path.display()));

        ctx.enter(CleanupStep::ConvertToHashtags);
        let converted = steps::convert_to_hashtags(
            store,
            &partition.to_delete,
            self.config.hashtag_batch_size,
            ctx,
        )
        .await;
        ctx.note(&format!(
            "{} hashtags added from {} categories",
            ctx.summary.hashtags_added,
            converted.len()
        ));

        ctx.enter(CleanupStep::DeleteLowCount);
        let deleted =
            steps::delete_categories(store, &converted, self.config.delete_batch_size, ctx).await;
        ctx.summary.deleted = deleted.len();
        ctx.note(&format!("{} categories deleted", ctx.summary.deleted));

        // Anything that survived deletion is still live and still owns its posts.
        let mut keep = partition.to_keep;
        keep.extend(
            partition
                .to_delete
                .into_iter()
                .filter(|c| !deleted.contains(&c.id)),
        );

        ctx.enter(CleanupStep::NormalizeCasing);
        ctx.summary.casing_renamed =
            steps::normalize_casing(store, &mut keep, self.config.rename_batch_size, ctx).await;
        ctx.note(&format!("{} categories renamed", ctx.summary.casing_renamed));

        ctx.enter(CleanupStep::PreClusterByStem);
        let stem_merges = steps::plan_stem_merges(&keep);
        ctx.note(&format!("{} stem groups to merge", stem_merges.len()));

        ctx.enter(CleanupStep::ExecutePreClusterMerges);
        ctx.summary.pre_cluster_merged = steps::execute_merges(
            store,
            &stem_merges,
            &mut keep,
            self.config.merge_batch_size,
            ctx,
        )
        .await;
        ctx.note(&format!(
            "{} categories merged by stem",
            ctx.summary.pre_cluster_merged
        ));

        ctx.enter(CleanupStep::GenerateEmbeddings);
        ctx.summary.embeddings_generated = steps::generate_missing_embeddings(
            store,
            self.embedder.as_ref(),
            &mut keep,
            self.config.embed_batch_size,
            &self.config.retry,
            ctx,
        )
        .await?;
        ctx.note(&format!(
            "{} embeddings generated",
            ctx.summary.embeddings_generated
        ));

        ctx.enter(CleanupStep::RepairOrphans);
        if ctx.config.reassign_orphans {
            let report = steps::repair_orphans(store, &mut keep, ctx).await?;
            ctx.summary.orphans_reassigned = report.reassigned;
            ctx.summary.orphans_unresolved = report.unresolved;
            ctx.note(&format!(
                "{} orphaned posts reassigned, {} left without a category",
                report.reassigned, report.unresolved
            ));
        } else {
            ctx.note("Orphan reassignment disabled");
        }

        ctx.enter(CleanupStep::ClusterByEmbedding);
        let clusters = steps::cluster_by_similarity(&keep, self.config.similarity_threshold);
        ctx.summary.clusters_found = clusters.len();
        let multi = clusters.iter().filter(|c| c.categories.len() > 1).count();
        ctx.note(&format!(
            "{} clusters, {} with more than one category",
            clusters.len(),
            multi
        ));

        ctx.enter(CleanupStep::OracleMergeClusters);
        let summaries: Vec<_> = clusters.iter().map(Cluster::summary).collect();
        let response = self.oracle.merge_similar_clusters(&summaries).await?;
        let semantic_merges = steps::plan_semantic_merges(&clusters, &response, &keep);
        ctx.note(&format!(
            "Oracle proposed {} merges, {} usable",
            response.merges.len(),
            semantic_merges.len()
        ));

        ctx.enter(CleanupStep::ExecuteSemanticMerges);
        ctx.summary.semantic_merged = steps::execute_merges(
            store,
            &semantic_merges,
            &mut keep,
            self.config.merge_batch_size,
            ctx,
        )
        .await;
        ctx.note(&format!(
            "{} categories merged by meaning",
            ctx.summary.semantic_merged
        ));

        ctx.enter(CleanupStep::OracleBuildHierarchy);
        let names: Vec<String> = keep.iter().map(|c| c.name.clone()).collect();
        let proposal = self.oracle.create_category_hierarchy(&names).await?;
        ctx.note(&format!("Oracle proposed {} parents", proposal.parents.len()));

        ctx.enter(CleanupStep::ApplyHierarchy);
        let applied = steps::apply_hierarchy(store, &proposal, &mut keep, ctx).await;
        ctx.summary.parents = applied.len();
        ctx.summary.children = applied.iter().map(|p| p.children.len()).sum();
        ctx.note(&format!(
            "{} parents with {} children",
            ctx.summary.parents, ctx.summary.children
        ));

        ctx.enter(CleanupStep::HandleOrphanParentPosts);
        ctx.summary.other_categories =
            steps::handle_orphan_parent_posts(store, &applied, &mut keep, ctx).await;
        ctx.note(&format!(
            "{} catch-all categories created",
            ctx.summary.other_categories
        ));

        ctx.summary.remaining = store.list_categories().await?.len();
        ctx.enter(CleanupStep::Done);
        info!(
            remaining = ctx.summary.remaining,
            deleted = ctx.summary.deleted,
            item_errors = ctx.summary.item_errors,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cleanup run finished"
        );
        Ok(ctx.summary.clone())
    }
}

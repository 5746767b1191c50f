//! Core traits for strata collaborators.
//!
//! The pipeline only ever talks to the category store, the embedding service
//! and the reasoning oracle through these traits, so every step can run
//! against PostgreSQL in production and against in-memory fakes in tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CATEGORY STORE
// =============================================================================

/// Graph-backed store of categories, posts and their "belongs-to" edges.
///
/// Deletion is always soft: a deleted category disappears from listings but
/// keeps its row (and any edges not moved off it) for backup restore.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// List all active categories, including embeddings when present.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Fetch one active category.
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>>;

    /// Create a new standalone category.
    async fn create_category(&self, name: &str, description: Option<&str>) -> Result<Category>;

    /// Mark a category inactive.
    async fn soft_delete_category(&self, id: Uuid) -> Result<()>;

    /// Move every post edge from `from` onto `to`.
    ///
    /// Idempotent: posts already linked to `to` are not linked twice, and
    /// re-running after completion moves nothing. Returns edges moved.
    async fn reassign_posts(&self, from: Uuid, to: Uuid) -> Result<u64>;

    /// Link a child category under a parent.
    async fn set_category_parent(&self, child_id: Uuid, parent_id: Uuid) -> Result<()>;

    /// Set or clear the parent flag.
    async fn set_category_is_parent(&self, id: Uuid, is_parent: bool) -> Result<()>;

    /// Change a category's display name.
    async fn rename_category(&self, id: Uuid, name: &str) -> Result<()>;

    /// Store a category's name embedding.
    async fn update_category_embedding(&self, id: Uuid, embedding: Vector) -> Result<()>;

    /// Recount distinct linked posts, persist the count and return it.
    async fn refresh_post_count(&self, id: Uuid) -> Result<i64>;

    /// IDs of posts linked to a category.
    async fn posts_for_category(&self, id: Uuid) -> Result<Vec<Uuid>>;

    /// IDs of active categories a post is linked to.
    async fn categories_for_post(&self, post_id: Uuid) -> Result<Vec<Uuid>>;

    /// Fetch a post including its embedding.
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>>;

    /// Attach a hashtag to a post. Attaching an existing hashtag is a no-op.
    async fn add_hashtag(&self, post_id: Uuid, hashtag: &str) -> Result<()>;

    /// Add a post -> category edge (no-op if present).
    async fn link_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()>;

    /// Remove a post -> category edge.
    async fn unlink_post(&self, post_id: Uuid, category_id: Uuid) -> Result<()>;

    /// Remove the edges from many posts to one category. Returns edges removed.
    async fn unlink_posts(&self, post_ids: &[Uuid], category_id: Uuid) -> Result<u64>;

    /// Posts that have at least one category edge but none into `keep_ids`.
    async fn find_orphan_posts(&self, keep_ids: &[Uuid]) -> Result<Vec<Uuid>>;

    /// Capture every category (active or not), edge and hashtag.
    async fn snapshot(&self) -> Result<TaxonomySnapshot>;

    /// Re-apply a snapshot taken by [`CategoryStore::snapshot`].
    async fn restore_snapshot(&self, snapshot: &TaxonomySnapshot) -> Result<()>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate text constrained to a JSON document.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// External reasoning service that proposes merges and a hierarchy.
///
/// Output is approximate: implementations decode and drop malformed entries,
/// and the pipeline validates what remains against live data.
#[async_trait]
pub trait TaxonomyOracle: Send + Sync {
    /// Decide which similarity clusters describe the same concept.
    async fn merge_similar_clusters(
        &self,
        clusters: &[ClusterSummary],
    ) -> Result<ClusterMergeResponse>;

    /// Group category names under parent categories.
    async fn create_category_hierarchy(&self, category_names: &[String])
        -> Result<HierarchyProposal>;
}

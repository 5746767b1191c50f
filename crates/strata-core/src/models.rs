//! Core data models for strata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// CATEGORY & POST
// =============================================================================

/// A named label grouping posts. May be a parent, a child, or standalone.
///
/// `post_count` is denormalized and only eventually consistent with the
/// membership edges; stores recompute it through
/// [`CategoryStore::refresh_post_count`](crate::CategoryStore::refresh_post_count).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    /// Canonical display string (title-cased after normalization).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub post_count: i64,
    /// Name embedding, populated lazily before semantic clustering.
    #[serde(skip)]
    pub embedding: Option<Vector>,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

impl Category {
    /// Create an in-memory category value with no embedding or parent.
    pub fn new(name: impl Into<String>, post_count: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            post_count,
            embedding: None,
            is_parent: false,
            parent_id: None,
        }
    }

    /// Embedding as a slice, if present.
    pub fn embedding_slice(&self) -> Option<&[f32]> {
        self.embedding.as_ref().map(|v| v.as_slice())
    }
}

/// A content item with category memberships, an optional embedding and
/// hashtags. Posts are never deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    /// Active category memberships (edges to soft-deleted categories excluded).
    pub category_ids: Vec<Uuid>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

// =============================================================================
// TRANSIENT PIPELINE VALUES
// =============================================================================

/// A keep/merge decision consumed once by the merge executor.
#[derive(Debug, Clone)]
pub struct MergeAction {
    /// Surviving category.
    pub keep: Category,
    /// Categories folded into `keep` and soft-deleted.
    pub merge: Vec<Category>,
    /// Oracle-proposed name for `keep` when it matches no member name.
    pub rename_to: Option<String>,
}

impl MergeAction {
    pub fn new(keep: Category, merge: Vec<Category>) -> Self {
        Self {
            keep,
            merge,
            rename_to: None,
        }
    }

    pub fn with_rename(mut self, name: impl Into<String>) -> Self {
        self.rename_to = Some(name.into());
        self
    }
}

/// A group of categories judged semantically similar by embedding distance.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Canonical id: the seed category's name.
    pub id: String,
    pub categories: Vec<Category>,
}

impl Cluster {
    /// Sum of member post counts.
    pub fn total_post_count(&self) -> i64 {
        self.categories.iter().map(|c| c.post_count).sum()
    }

    /// Oracle-facing view of this cluster.
    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            id: self.id.clone(),
            categories: self.categories.iter().map(|c| c.name.clone()).collect(),
            post_count: self.total_post_count(),
        }
    }
}

/// Cluster description sent to the oracle's merge operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub id: String,
    pub categories: Vec<String>,
    pub post_count: i64,
}

/// One merge proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMergeProposal {
    pub cluster_ids: Vec<String>,
    pub canonical_name: String,
    #[serde(default)]
    pub reason: String,
}

/// Oracle response to a cluster merge request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMergeResponse {
    pub merges: Vec<ClusterMergeProposal>,
}

/// One parent proposed by the oracle. `children` are category names resolved
/// against the live keep set at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedParent {
    pub name: String,
    pub children: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

/// Oracle-proposed two-level hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyProposal {
    pub parents: Vec<ProposedParent>,
}

// =============================================================================
// RUN CONFIGURATION & SUMMARY
// =============================================================================

/// Per-invocation cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Categories with fewer posts than this are converted to hashtags and deleted.
    pub min_post_threshold: i64,
    /// Whether orphaned posts are reassigned by embedding similarity.
    #[serde(default = "default_true")]
    pub reassign_orphans: bool,
    /// Stop after the analyze step without mutating anything.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            min_post_threshold: crate::defaults::MIN_POST_THRESHOLD,
            reassign_orphans: true,
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn new(min_post_threshold: i64) -> Self {
        Self {
            min_post_threshold,
            ..Self::default()
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_reassign_orphans(mut self, reassign: bool) -> Self {
        self.reassign_orphans = reassign;
        self
    }

    /// Reject configurations that must never reach a mutation step.
    pub fn validate(&self) -> Result<()> {
        if self.min_post_threshold < 0 {
            return Err(Error::InvalidInput(format!(
                "minPostThreshold must be >= 0, got {}",
                self.min_post_threshold
            )));
        }
        Ok(())
    }
}

/// Aggregate counts reported at the end of a run (or after a dry run).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_categories: usize,
    pub to_keep: usize,
    pub to_delete: usize,
    pub deleted: usize,
    pub hashtags_added: usize,
    pub casing_renamed: usize,
    pub pre_cluster_merged: usize,
    pub embeddings_generated: usize,
    pub orphans_reassigned: usize,
    pub orphans_unresolved: usize,
    pub clusters_found: usize,
    pub semantic_merged: usize,
    pub parents: usize,
    pub children: usize,
    pub other_categories: usize,
    pub remaining: usize,
    pub item_errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    pub dry_run: bool,
}

// =============================================================================
// BACKUP SNAPSHOT
// =============================================================================

/// Category row as captured by a backup, including soft-deleted ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub post_count: i64,
    pub is_parent: bool,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub deleted: bool,
}

/// A post -> category "belongs-to" edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub post_id: Uuid,
    pub category_id: Uuid,
}

/// Hashtags attached to one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostHashtags {
    pub post_id: Uuid,
    pub hashtags: Vec<String>,
}

/// Pre-mutation checkpoint of the category graph, used for manual restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomySnapshot {
    pub taken_at: DateTime<Utc>,
    pub categories: Vec<CategoryRecord>,
    pub memberships: Vec<Membership>,
    pub hashtags: Vec<PostHashtags>,
}

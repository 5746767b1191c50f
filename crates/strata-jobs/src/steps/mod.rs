//! Pipeline steps. Each works on the run's keep set and records per-item
//! failures in the [`RunContext`](crate::context::RunContext).

pub mod casing;
pub mod clustering;
pub mod hierarchy;
pub mod merge;
pub mod orphans;
pub mod precluster;
pub mod semantic;
pub mod threshold;

pub use casing::normalize_casing;
pub use clustering::{cluster_by_similarity, generate_missing_embeddings};
pub use hierarchy::{
    apply_hierarchy, handle_orphan_parent_posts, other_category_name, AppliedParent,
};
pub use merge::execute_merges;
pub use orphans::{repair_orphans, RepairReport};
pub use precluster::plan_stem_merges;
pub use semantic::plan_semantic_merges;
pub use threshold::{convert_to_hashtags, delete_categories, partition_by_threshold, Partition};

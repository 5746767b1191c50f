//! Threshold filter, hashtag conversion and low-count deletion.

use futures::future::join_all;
use tracing::{debug, trace};
use uuid::Uuid;

use strata_core::{to_hashtag, Category, CategoryStore, Result};

use crate::context::RunContext;

/// Categories split by minimum post count.
#[derive(Debug, Default)]
pub struct Partition {
    pub to_keep: Vec<Category>,
    pub to_delete: Vec<Category>,
}

/// Keep categories with `post_count >= min_post_threshold`, in input order.
pub fn partition_by_threshold(categories: Vec<Category>, min_post_threshold: i64) -> Partition {
    let (to_keep, to_delete) = categories
        .into_iter()
        .partition(|c| c.post_count >= min_post_threshold);
    Partition { to_keep, to_delete }
}

async fn attach_hashtag(store: &dyn CategoryStore, category: &Category) -> Result<usize> {
    let Some(tag) = to_hashtag(&category.name) else {
        debug!(category_id = %category.id, category_name = %category.name, "Name yields no hashtag");
        return Ok(0);
    };
    let posts = store.posts_for_category(category.id).await?;
    for &post_id in &posts {
        store.add_hashtag(post_id, &tag).await?;
        trace!(post_id = %post_id, hashtag = %tag, "Hashtag attached");
    }
    Ok(posts.len())
}

/// Attach each category's name as a hashtag to all of its posts.
///
/// Runs `batch_size` categories concurrently. Returns the ids whose
/// conversion finished; only those may be deleted afterwards.
pub async fn convert_to_hashtags(
    store: &dyn CategoryStore,
    categories: &[Category],
    batch_size: usize,
    ctx: &mut RunContext,
) -> Vec<Uuid> {
    let mut converted = Vec::with_capacity(categories.len());
    for batch in categories.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(|c| attach_hashtag(store, c))).await;
        for (category, result) in batch.iter().zip(results) {
            match result {
                Ok(attached) => {
                    ctx.summary.hashtags_added += attached;
                    converted.push(category.id);
                }
                Err(e) => ctx.item_failed("convert_to_hashtag", category.id, &e),
            }
        }
    }
    converted
}

/// Soft-delete categories in concurrent batches. Returns the ids deleted.
pub async fn delete_categories(
    store: &dyn CategoryStore,
    ids: &[Uuid],
    batch_size: usize,
    ctx: &mut RunContext,
) -> Vec<Uuid> {
    let mut deleted = Vec::with_capacity(ids.len());
    for batch in ids.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(|&id| store.soft_delete_category(id))).await;
        for (&id, result) in batch.iter().zip(results) {
            match result {
                Ok(()) => deleted.push(id),
                Err(e) => ctx.item_failed("soft_delete_category", id, &e),
            }
        }
    }
    deleted
}

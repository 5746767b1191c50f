//! Merge executor: fold merge categories into their survivor.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, instrument};
use uuid::Uuid;

use strata_core::{Category, CategoryStore, Error, MergeAction};

use crate::context::RunContext;

/// What happened to one [`MergeAction`].
#[derive(Debug)]
struct MergeOutcome {
    keep_id: Uuid,
    renamed_to: Option<String>,
    merged: Vec<Uuid>,
    post_count: Option<i64>,
    failures: Vec<(&'static str, Uuid, Error)>,
}

async fn apply_merge(store: &dyn CategoryStore, action: &MergeAction) -> MergeOutcome {
    let keep_id = action.keep.id;
    let mut outcome = MergeOutcome {
        keep_id,
        renamed_to: None,
        merged: Vec::with_capacity(action.merge.len()),
        post_count: None,
        failures: Vec::new(),
    };

    if let Some(name) = action.rename_to.as_deref().filter(|n| *n != action.keep.name) {
        match store.rename_category(keep_id, name).await {
            Ok(()) => outcome.renamed_to = Some(name.to_string()),
            Err(e) => outcome.failures.push(("rename_category", keep_id, e)),
        }
    }

    for loser in &action.merge {
        if loser.id == keep_id {
            continue;
        }
        if let Err(e) = store.reassign_posts(loser.id, keep_id).await {
            outcome.failures.push(("reassign_posts", loser.id, e));
            continue;
        }
        match store.soft_delete_category(loser.id).await {
            Ok(()) => outcome.merged.push(loser.id),
            Err(e) => outcome.failures.push(("soft_delete_category", loser.id, e)),
        }
    }

    match store.refresh_post_count(keep_id).await {
        Ok(count) => outcome.post_count = Some(count),
        Err(e) => outcome.failures.push(("refresh_post_count", keep_id, e)),
    }
    outcome
}

/// Execute merge actions in concurrent batches.
///
/// Each merged category's edges move onto the survivor, the merged category
/// is soft-deleted and dropped from `keep`, and the survivor's name and post
/// count in `keep` are updated. Re-running an action is harmless. Returns the
/// number of categories merged away.
#[instrument(skip_all, fields(subsystem = "jobs", component = "merge", action_count = actions.len()))]
pub async fn execute_merges(
    store: &dyn CategoryStore,
    actions: &[MergeAction],
    keep: &mut Vec<Category>,
    batch_size: usize,
    ctx: &mut RunContext,
) -> usize {
    let mut merged_total = 0;
    let mut removed: HashSet<Uuid> = HashSet::new();

    for batch in actions.chunks(batch_size.max(1)) {
        let outcomes = join_all(batch.iter().map(|action| apply_merge(store, action))).await;
        for outcome in outcomes {
            for (op, id, error) in &outcome.failures {
                ctx.item_failed(op, id, error);
            }
            if let Some(survivor) = keep.iter_mut().find(|c| c.id == outcome.keep_id) {
                if let Some(name) = outcome.renamed_to {
                    survivor.name = name;
                }
                if let Some(count) = outcome.post_count {
                    survivor.post_count = count;
                }
            }
            debug!(
                keep_id = %outcome.keep_id,
                merged = outcome.merged.len(),
                "Merge applied"
            );
            merged_total += outcome.merged.len();
            removed.extend(outcome.merged);
        }
    }

    keep.retain(|c| !removed.contains(&c.id));
    merged_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::RunConfig;
    use strata_db::InMemoryCategoryStore;

    fn ctx() -> RunContext {
        RunContext::new(Uuid::now_v7(), RunConfig::default())
    }

    #[tokio::test]
    async fn test_merge_moves_edges_without_double_counting() {
        let store = InMemoryCategoryStore::new();
        let keep_id = store.add_category("Outfits").await;
        let loser_id = store.add_category("Outfit").await;
        store.add_posts(keep_id, 2).await;
        store.add_posts(loser_id, 3).await;
        // Linked to both: must count once after the merge.
        store.add_post(None, &[keep_id, loser_id]).await;

        let mut keep = store.list_categories().await.unwrap();
        let action = MergeAction::new(keep[0].clone(), vec![keep[1].clone()]);
        let merged = execute_merges(&store, &[action], &mut keep, 20, &mut ctx()).await;

        assert_eq!(merged, 1);
        assert_eq!(keep.len(), 1);
        assert_eq!(keep[0].post_count, 6);
        assert_eq!(store.get_category(keep_id).await.unwrap().unwrap().post_count, 6);
        let (_, deleted) = store.category_including_deleted(loser_id).await.unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_merge_twice_is_idempotent() {
        let store = InMemoryCategoryStore::new();
        let keep_id = store.add_category("Travel").await;
        let loser_id = store.add_category("Trips").await;
        store.add_posts(keep_id, 1).await;
        store.add_posts(loser_id, 2).await;
        store.add_post(None, &[keep_id, loser_id]).await;

        let categories = store.list_categories().await.unwrap();
        let action = MergeAction::new(categories[0].clone(), vec![categories[1].clone()]);

        let mut keep = categories.clone();
        execute_merges(&store, &[action.clone()], &mut keep, 20, &mut ctx()).await;
        let edges_once = store.edge_count().await;
        let posts_once = store.posts_for_category(keep_id).await.unwrap();

        let mut keep_again = categories.clone();
        execute_merges(&store, &[action], &mut keep_again, 20, &mut ctx()).await;
        assert_eq!(store.edge_count().await, edges_once);
        assert_eq!(store.posts_for_category(keep_id).await.unwrap(), posts_once);
        assert_eq!(store.get_category(keep_id).await.unwrap().unwrap().post_count, 4);
    }

    #[tokio::test]
    async fn test_rename_applied_to_survivor() {
        let store = InMemoryCategoryStore::new();
        store.add_category("Eats").await;
        store.add_category("Food Stuff").await;

        let mut keep = store.list_categories().await.unwrap();
        let action = MergeAction::new(keep[0].clone(), vec![keep[1].clone()])
            .with_rename("Food & Drink");
        execute_merges(&store, &[action], &mut keep, 20, &mut ctx()).await;

        assert_eq!(keep.len(), 1);
        assert_eq!(keep[0].name, "Food & Drink");
        assert!(store.find_by_name("Food & Drink").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_loser_stays_in_keep_set() {
        let store = InMemoryCategoryStore::new();
        let keep_id = store.add_category("Hiking").await;
        let ok_id = store.add_category("Hikes").await;
        let bad_id = store.add_category("Hike").await;
        store.add_posts(ok_id, 1).await;
        store.add_posts(bad_id, 1).await;
        store.fail_writes_to(bad_id).await;

        let mut keep = store.list_categories().await.unwrap();
        let action = MergeAction::new(keep[0].clone(), vec![keep[1].clone(), keep[2].clone()]);
        let mut ctx = ctx();
        let merged = execute_merges(&store, &[action], &mut keep, 20, &mut ctx).await;

        assert_eq!(merged, 1);
        assert_eq!(ctx.summary.item_errors, 1);
        let ids: Vec<Uuid> = keep.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![keep_id, bad_id]);
    }
}

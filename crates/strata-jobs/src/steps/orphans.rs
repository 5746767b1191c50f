//! Orphan repair: give posts that lost every kept category a new home.

use std::collections::HashSet;

use tracing::{debug, instrument, trace};
use uuid::Uuid;

use strata_core::{best_match, Category, CategoryStore, Result};

use crate::context::RunContext;

/// Counts from one repair pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub reassigned: usize,
    pub unresolved: usize,
}

/// Link each orphaned post to the keep category most similar to it.
///
/// Posts are handled one at a time. A post without an embedding (or with no
/// embedded keep category to compare against) stays orphaned and counts as
/// unresolved. Finding the orphans is the only call whose failure aborts.
#[instrument(skip_all, fields(subsystem = "jobs", component = "orphans", keep_count = keep.len()))]
pub async fn repair_orphans(
    store: &dyn CategoryStore,
    keep: &mut [Category],
    ctx: &mut RunContext,
) -> Result<RepairReport> {
    let keep_ids: Vec<Uuid> = keep.iter().map(|c| c.id).collect();
    let orphans = store.find_orphan_posts(&keep_ids).await?;
    debug!(orphan_count = orphans.len(), "Orphaned posts found");

    let mut report = RepairReport::default();
    let mut touched: HashSet<usize> = HashSet::new();

    for post_id in orphans {
        let post = match store.get_post(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => continue,
            Err(e) => {
                ctx.item_failed("get_post", post_id, &e);
                report.unresolved += 1;
                continue;
            }
        };
        let Some(query) = post.embedding.as_ref().map(|v| v.as_slice()) else {
            trace!(post_id = %post_id, "Orphan has no embedding");
            report.unresolved += 1;
            continue;
        };
        let Some((index, score)) = best_match(query, keep.iter().map(|c| c.embedding_slice()))
        else {
            report.unresolved += 1;
            continue;
        };

        match store.link_post(post_id, keep[index].id).await {
            Ok(()) => {
                trace!(post_id = %post_id, category_id = %keep[index].id, score, "Orphan reassigned");
                touched.insert(index);
                report.reassigned += 1;
            }
            Err(e) => {
                ctx.item_failed("link_post", post_id, &e);
                report.unresolved += 1;
            }
        }
    }

    for index in touched {
        match store.refresh_post_count(keep[index].id).await {
            Ok(count) => keep[index].post_count = count,
            Err(e) => ctx.item_failed("refresh_post_count", keep[index].id, &e),
        }
    }
    Ok(report)
}

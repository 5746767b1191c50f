//! Turn the oracle's cluster merges into validated merge actions.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use strata_core::{
    format_category_name, normalize, Category, Cluster, ClusterMergeResponse, MergeAction,
};

fn survivor_order(a: &Category, b: &Category) -> Ordering {
    b.post_count
        .cmp(&a.post_count)
        .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Validate oracle merges against the clusters sent and the live keep set.
///
/// Unknown cluster ids and empty canonical names are dropped with a warning,
/// a cluster is used by at most one merge (first proposal wins), and a merge
/// needs at least two distinct clusters. The survivor is the member named
/// like the canonical name, or else the largest member, renamed to the
/// formatted canonical name. The rename is skipped when another live
/// category, or an earlier merge's rename, already holds that name.
pub fn plan_semantic_merges(
    clusters: &[Cluster],
    response: &ClusterMergeResponse,
    keep: &[Category],
) -> Vec<MergeAction> {
    let by_id: HashMap<&str, &Cluster> = clusters.iter().map(|c| (c.id.as_str(), c)).collect();
    let live: HashMap<Uuid, &Category> = keep.iter().map(|c| (c.id, c)).collect();
    let mut consumed: HashSet<&str> = HashSet::new();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut actions = Vec::new();

    for proposal in &response.merges {
        let canonical = proposal.canonical_name.trim();
        if canonical.is_empty() {
            warn!(cluster_ids = ?proposal.cluster_ids, "Merge without canonical name dropped");
            continue;
        }

        let mut resolved: Vec<&Cluster> = Vec::new();
        for id in &proposal.cluster_ids {
            match by_id.get(id.as_str()).copied() {
                None => warn!(cluster_id = %id, "Oracle referenced unknown cluster"),
                Some(cluster) if consumed.contains(cluster.id.as_str()) => {
                    debug!(cluster_id = %id, "Cluster already merged, skipped")
                }
                Some(cluster) => {
                    if !resolved.iter().any(|c| c.id == cluster.id) {
                        resolved.push(cluster);
                    }
                }
            }
        }
        if resolved.len() < 2 {
            warn!(
                canonical = %canonical,
                resolved = resolved.len(),
                "Merge needs at least two clusters, dropped"
            );
            continue;
        }
        for &cluster in &resolved {
            consumed.insert(cluster.id.as_str());
        }

        let mut members: Vec<Category> = resolved
            .iter()
            .flat_map(|cluster| cluster.categories.iter())
            .filter_map(|c| live.get(&c.id).map(|current| (*current).clone()))
            .collect();
        if members.len() < 2 {
            debug!(canonical = %canonical, "Fewer than two live members, nothing to merge");
            continue;
        }
        members.sort_by(survivor_order);

        let wanted = normalize(canonical);
        let action = match members.iter().position(|c| normalize(&c.name) == wanted) {
            Some(index) => {
                let keep = members.remove(index);
                MergeAction::new(keep, members)
            }
            None => {
                let taken = claimed.contains(&wanted)
                    || keep.iter().any(|c| {
                        normalize(&c.name) == wanted && !members.iter().any(|m| m.id == c.id)
                    });
                let survivor = members.remove(0);
                if taken {
                    warn!(
                        canonical = %canonical,
                        keep = %survivor.name,
                        "Canonical name already in use, survivor keeps its name"
                    );
                    MergeAction::new(survivor, members)
                } else {
                    claimed.insert(wanted);
                    MergeAction::new(survivor, members)
                        .with_rename(format_category_name(canonical))
                }
            }
        };
        debug!(
            keep = %action.keep.name,
            rename_to = ?action.rename_to,
            merged = action.merge.len(),
            "Semantic merge planned"
        );
        actions.push(action);
    }
    actions
}

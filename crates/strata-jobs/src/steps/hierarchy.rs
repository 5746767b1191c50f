//! Hierarchy application and parent-only post handling.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use strata_core::defaults::OTHER_CATEGORY_PREFIX;
use strata_core::{format_category_name, normalize, Category, CategoryStore, HierarchyProposal};

use crate::context::RunContext;

/// A parent that was created or promoted, with the children linked under it.
#[derive(Debug, Clone)]
pub struct AppliedParent {
    pub parent: Category,
    pub children: Vec<Uuid>,
}

/// Index of `keep` by normalized name; the first category wins a name.
fn name_index(keep: &[Category]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, category) in keep.iter().enumerate() {
        index.entry(normalize(&category.name)).or_insert(i);
    }
    index
}

/// Apply an oracle hierarchy proposal to the keep set.
///
/// Children are resolved by normalized name against `keep`; unknown names
/// are dropped. A parent whose children resolve to nothing is skipped. An
/// existing category with the parent's name is promoted, otherwise a new one
/// is created with the oracle's reason as its description and appended to
/// `keep`. A child already placed under an earlier parent, or itself a
/// parent, is not linked again.
#[instrument(skip_all, fields(subsystem = "jobs", component = "hierarchy", proposed = proposal.parents.len()))]
pub async fn apply_hierarchy(
    store: &dyn CategoryStore,
    proposal: &HierarchyProposal,
    keep: &mut Vec<Category>,
    ctx: &mut RunContext,
) -> Vec<AppliedParent> {
    let mut applied = Vec::new();
    let mut parents: HashSet<Uuid> = keep.iter().filter(|c| c.is_parent).map(|c| c.id).collect();
    let mut placed: HashSet<Uuid> = keep
        .iter()
        .filter(|c| c.parent_id.is_some())
        .map(|c| c.id)
        .collect();

    for proposed in &proposal.parents {
        let parent_name = format_category_name(&proposed.name);
        let by_name = name_index(keep);
        let existing = by_name.get(&normalize(&parent_name)).copied();
        let existing_id = existing.map(|i| keep[i].id);

        let mut seen = HashSet::new();
        let children: Vec<usize> = proposed
            .children
            .iter()
            .filter_map(|name| {
                let found = by_name.get(&normalize(name)).copied();
                if found.is_none() {
                    debug!(parent = %parent_name, child = %name, "Unknown child dropped");
                }
                found
            })
            .filter(|&i| Some(keep[i].id) != existing_id)
            .filter(|&i| !parents.contains(&keep[i].id) && !placed.contains(&keep[i].id))
            .filter(|&i| seen.insert(i))
            .collect();

        if children.is_empty() {
            debug!(parent = %parent_name, "No children resolved, parent skipped");
            continue;
        }
        if let Some(i) = existing {
            if placed.contains(&keep[i].id) {
                debug!(parent = %parent_name, "Parent is already a child, skipped");
                continue;
            }
        }

        let parent_index = match existing {
            Some(i) => i,
            None => {
                let reason = Some(proposed.reason.as_str()).filter(|r| !r.trim().is_empty());
                match store.create_category(&parent_name, reason).await {
                    Ok(created) => {
                        keep.push(created);
                        keep.len() - 1
                    }
                    Err(e) => {
                        ctx.item_failed("create_category", &parent_name, &e);
                        continue;
                    }
                }
            }
        };
        let parent_id = keep[parent_index].id;

        if let Err(e) = store.set_category_is_parent(parent_id, true).await {
            ctx.item_failed("set_category_is_parent", parent_id, &e);
            continue;
        }

        let mut linked = Vec::with_capacity(children.len());
        for child_index in children {
            let child_id = keep[child_index].id;
            match store.set_category_parent(child_id, parent_id).await {
                Ok(()) => {
                    keep[child_index].parent_id = Some(parent_id);
                    placed.insert(child_id);
                    linked.push(child_id);
                }
                Err(e) => ctx.item_failed("set_category_parent", child_id, &e),
            }
        }

        if linked.is_empty() {
            warn!(parent = %parent_name, "Every child link failed, reverting parent flag");
            if let Err(e) = store.set_category_is_parent(parent_id, false).await {
                ctx.item_failed("set_category_is_parent", parent_id, &e);
            }
            continue;
        }

        keep[parent_index].is_parent = true;
        parents.insert(parent_id);
        debug!(parent = %parent_name, children = linked.len(), promoted = existing.is_some(), "Parent applied");
        applied.push(AppliedParent {
            parent: keep[parent_index].clone(),
            children: linked,
        });
    }
    applied
}

/// Name of the catch-all child under `parent_name`.
pub fn other_category_name(parent_name: &str) -> String {
    format!("{} {}", OTHER_CATEGORY_PREFIX, parent_name)
}

/// Clean up posts linked directly to a parent.
///
/// A post that also links to one of the parent's children loses the
/// redundant parent link (one batch delete per parent). A post with no link
/// to any of the children moves to an `"Other <Parent>"` child, created on
/// first need or reused when it already exists. An existing one that is a
/// parent itself or sits under another parent is left alone, and the posts
/// stay on the parent. Returns how many such children were newly created.
#[instrument(skip_all, fields(subsystem = "jobs", component = "hierarchy", parent_count = applied.len()))]
pub async fn handle_orphan_parent_posts(
    store: &dyn CategoryStore,
    applied: &[AppliedParent],
    keep: &mut Vec<Category>,
    ctx: &mut RunContext,
) -> usize {
    let mut created = 0;

    for entry in applied {
        let parent = &entry.parent;
        let children: HashSet<Uuid> = entry.children.iter().copied().collect();
        let posts = match store.posts_for_category(parent.id).await {
            Ok(posts) => posts,
            Err(e) => {
                ctx.item_failed("posts_for_category", parent.id, &e);
                continue;
            }
        };

        let mut redundant = Vec::new();
        let mut bare = Vec::new();
        for post_id in posts {
            match store.categories_for_post(post_id).await {
                Ok(categories) if categories.iter().any(|c| children.contains(c)) => {
                    redundant.push(post_id)
                }
                Ok(_) => bare.push(post_id),
                Err(e) => ctx.item_failed("categories_for_post", post_id, &e),
            }
        }

        if !redundant.is_empty() {
            match store.unlink_posts(&redundant, parent.id).await {
                Ok(removed) => debug!(parent = %parent.name, removed, "Redundant parent links removed"),
                Err(e) => ctx.item_failed("unlink_posts", parent.id, &e),
            }
        }

        if !bare.is_empty() {
            let other_name = other_category_name(&parent.name);
            let existing = keep
                .iter()
                .position(|c| normalize(&c.name) == normalize(&other_name));
            let other_index = match existing {
                Some(i) if keep[i].is_parent || keep[i].parent_id.is_some_and(|p| p != parent.id) => {
                    warn!(
                        parent = %parent.name,
                        other = %keep[i].name,
                        "Catch-all name belongs to another branch, posts stay on the parent"
                    );
                    continue;
                }
                Some(i) => i,
                None => {
                    let description = format!(
                        "Posts filed under {} that fit none of its subcategories",
                        parent.name
                    );
                    match store.create_category(&other_name, Some(&description)).await {
                        Ok(category) => {
                            created += 1;
                            keep.push(category);
                            keep.len() - 1
                        }
                        Err(e) => {
                            ctx.item_failed("create_category", &other_name, &e);
                            continue;
                        }
                    }
                }
            };
            let other_id = keep[other_index].id;
            match store.set_category_parent(other_id, parent.id).await {
                Ok(()) => keep[other_index].parent_id = Some(parent.id),
                Err(e) => {
                    ctx.item_failed("set_category_parent", other_id, &e);
                    continue;
                }
            }

            for post_id in bare {
                if let Err(e) = store.link_post(post_id, other_id).await {
                    ctx.item_failed("link_post", post_id, &e);
                    continue;
                }
                if let Err(e) = store.unlink_post(post_id, parent.id).await {
                    ctx.item_failed("unlink_post", post_id, &e);
                }
            }
            match store.refresh_post_count(other_id).await {
                Ok(count) => keep[other_index].post_count = count,
                Err(e) => ctx.item_failed("refresh_post_count", other_id, &e),
            }
        }

        if let Err(e) = store.refresh_post_count(parent.id).await {
            ctx.item_failed("refresh_post_count", parent.id, &e);
        }
    }
    created
}

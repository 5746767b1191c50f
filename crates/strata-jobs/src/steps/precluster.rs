//! Lexical pre-clustering: fold categories whose names share a stem.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use strata_core::{has_plural_suffix, stem, Category, MergeAction};

/// Survivor ordering inside one stem group. `Less` means "a wins".
fn survivor_order(a: &Category, b: &Category, prefer_plural: bool) -> Ordering {
    let plural = if prefer_plural {
        has_plural_suffix(&b.name).cmp(&has_plural_suffix(&a.name))
    } else {
        Ordering::Equal
    };
    plural
        .then_with(|| b.post_count.cmp(&a.post_count))
        .then_with(|| a.name.chars().count().cmp(&b.name.chars().count()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Group categories by stemmed name and emit one merge per group of two or
/// more. Groups appear in first-seen order.
pub fn plan_stem_merges(categories: &[Category]) -> Vec<MergeAction> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Category>> = HashMap::new();
    for category in categories {
        let key = stem(&category.name);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(category.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let mut members = groups.remove(&key)?;
            if members.len() < 2 {
                return None;
            }
            let plural_count = members
                .iter()
                .filter(|c| has_plural_suffix(&c.name))
                .count();
            let prefer_plural = plural_count > 0 && plural_count < members.len();
            members.sort_by(|a, b| survivor_order(a, b, prefer_plural));

            let keep = members.remove(0);
            debug!(
                stem = %key,
                keep = %keep.name,
                merged = members.len(),
                "Stem group resolved"
            );
            Some(MergeAction::new(keep, members))
        })
        .collect()
}

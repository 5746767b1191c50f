//! Normalize-casing step: rename keep categories to their display form.

use futures::future::join_all;
use tracing::debug;

use strata_core::{format_category_name, Category, CategoryStore};

use crate::context::RunContext;

/// Rename every category whose name differs from its formatted form.
///
/// Successful renames are applied to `keep` in place. Returns the rename count.
pub async fn normalize_casing(
    store: &dyn CategoryStore,
    keep: &mut [Category],
    batch_size: usize,
    ctx: &mut RunContext,
) -> usize {
    let pending: Vec<(usize, String)> = keep
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let formatted = format_category_name(&c.name);
            (formatted != c.name).then_some((i, formatted))
        })
        .collect();

    let mut renamed = 0;
    for batch in pending.chunks(batch_size.max(1)) {
        let results = join_all(
            batch
                .iter()
                .map(|(i, name)| store.rename_category(keep[*i].id, name)),
        )
        .await;
        for ((i, name), result) in batch.iter().zip(results) {
            match result {
                Ok(()) => {
                    debug!(category_id = %keep[*i].id, from = %keep[*i].name, to = %name, "Category renamed");
                    keep[*i].name = name.clone();
                    renamed += 1;
                }
                Err(e) => ctx.item_failed("rename_category", keep[*i].id, &e),
            }
        }
    }
    renamed
}

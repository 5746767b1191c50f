//! Name embeddings and greedy seed-based clustering.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, instrument};

use strata_core::{cosine_similarity, Category, CategoryStore, Cluster, EmbeddingBackend, Result};
use strata_inference::{embed_with_retry, RetryPolicy};

use crate::context::RunContext;

/// Embed every category in `keep` that has no embedding yet.
///
/// Names go to the backend `batch_size` at a time with batch-level retry; a
/// batch that still fails aborts with the embedding error. Vectors are stored
/// concurrently per batch (store failures are per-item) and always attached
/// to `keep` in memory. Returns the number of embeddings generated.
#[instrument(skip_all, fields(subsystem = "jobs", component = "clustering", op = "generate_embeddings", model = %embedder.model_name()))]
pub async fn generate_missing_embeddings(
    store: &dyn CategoryStore,
    embedder: &dyn EmbeddingBackend,
    keep: &mut [Category],
    batch_size: usize,
    retry: &RetryPolicy,
    ctx: &mut RunContext,
) -> Result<usize> {
    let missing: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter(|(_, c)| c.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    let start = Instant::now();
    let mut generated = 0;
    for batch in missing.chunks(batch_size.max(1)) {
        let names: Vec<String> = batch.iter().map(|&i| keep[i].name.clone()).collect();
        let vectors = embed_with_retry(embedder, &names, retry).await?;

        let writes = join_all(
            batch
                .iter()
                .zip(&vectors)
                .map(|(&i, vector)| store.update_category_embedding(keep[i].id, vector.clone())),
        )
        .await;
        for ((&i, vector), result) in batch.iter().zip(vectors).zip(writes) {
            if let Err(e) = result {
                ctx.item_failed("update_category_embedding", keep[i].id, &e);
            }
            keep[i].embedding = Some(vector);
            generated += 1;
        }
        debug!(batch_len = batch.len(), generated, "Embedding batch stored");
    }

    info!(
        generated,
        duration_ms = start.elapsed().as_millis() as u64,
        "Category embeddings generated"
    );
    Ok(generated)
}

/// Single-link greedy clustering against each cluster's seed.
///
/// Walks `categories` in order; each unvisited category seeds a cluster and
/// pulls in every later unvisited category whose cosine similarity to the
/// seed is at least `threshold`. Categories without an embedding end up
/// alone. Cluster ids are seed names, suffixed when two seeds share a name.
/// Output is sorted by total post count, largest first, ties in seed order.
pub fn cluster_by_similarity(categories: &[Category], threshold: f32) -> Vec<Cluster> {
    let mut visited = vec![false; categories.len()];
    let mut clusters = Vec::new();
    let mut seen_ids: HashMap<String, usize> = HashMap::new();

    for seed_index in 0..categories.len() {
        if visited[seed_index] {
            continue;
        }
        visited[seed_index] = true;
        let seed = &categories[seed_index];
        let mut members = vec![seed.clone()];

        if let Some(seed_vector) = seed.embedding_slice() {
            for candidate_index in seed_index + 1..categories.len() {
                if visited[candidate_index] {
                    continue;
                }
                let Some(candidate) = categories[candidate_index].embedding_slice() else {
                    continue;
                };
                if cosine_similarity(seed_vector, candidate) >= threshold {
                    visited[candidate_index] = true;
                    members.push(categories[candidate_index].clone());
                }
            }
        }

        let uses = seen_ids.entry(seed.name.clone()).or_insert(0);
        *uses += 1;
        let id = if *uses == 1 {
            seed.name.clone()
        } else {
            format!("{} ({})", seed.name, uses)
        };
        if members.len() > 1 {
            debug!(cluster = %id, size = members.len(), "Cluster formed");
        }
        clusters.push(Cluster {
            id,
            categories: members,
        });
    }

    clusters.sort_by(|a, b| b.total_post_count().cmp(&a.total_post_count()));
    clusters
}

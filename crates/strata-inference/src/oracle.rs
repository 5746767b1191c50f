//! LLM-backed taxonomy oracle.
//!
//! Prompts a [`GenerationBackend`] for cluster merges and a parent/child
//! hierarchy, then decodes the answer in two levels: the document shape must
//! be right or the call fails with `Error::Oracle`; individual entries that do
//! not decode are dropped with a warning.

use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use strata_core::{
    ClusterMergeProposal, ClusterMergeResponse, ClusterSummary, Error, GenerationBackend,
    HierarchyProposal, ProposedParent, Result, TaxonomyOracle,
};

const MERGE_SYSTEM_PROMPT: &str = r#"You consolidate a category taxonomy for a collection of social media posts.
You receive clusters of category names that an embedding model judged similar, with the number of posts in each cluster.
Decide which clusters describe the same concept and should become one category.

Rules:
- Only merge clusters that mean the same thing to a reader browsing posts.
- Use cluster ids exactly as given. Every merge lists at least two cluster ids.
- canonicalName is the best display name for the merged category, in Title Case.
- If nothing should be merged, return an empty list.

Respond with JSON only, in this shape:
{"merges": [{"clusterIds": ["id one", "id two"], "canonicalName": "Name", "reason": "short reason"}]}"#;

const HIERARCHY_SYSTEM_PROMPT: &str = r#"You organize a flat list of category names into a two-level hierarchy.
Group related categories under broader parent categories.

Rules:
- Every child must be copied exactly from the given list.
- A parent may reuse a name from the list or introduce a new broader name.
- Do not nest parents under parents. Leave categories that fit nowhere out.
- Give a one-sentence reason for each parent.

Respond with JSON only, in this shape:
{"parents": [{"name": "Parent", "children": ["Child A", "Child B"], "reason": "short reason"}]}"#;

/// One decoded array entry from an oracle document.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleEntry<T> {
    Valid(T),
    Malformed { index: usize, reason: String },
}

impl<T> OracleEntry<T> {
    pub fn into_valid(self) -> Option<T> {
        match self {
            OracleEntry::Valid(value) => Some(value),
            OracleEntry::Malformed { .. } => None,
        }
    }
}

/// Cut the outermost JSON object out of a model response.
///
/// Handles markdown code fences and prose before or after the object.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// Decode `document[key]` as an array of `T`, entry by entry.
pub fn decode_entries<T: DeserializeOwned>(
    document: &Value,
    key: &str,
) -> Result<Vec<OracleEntry<T>>> {
    let entries = document
        .as_object()
        .ok_or_else(|| Error::Oracle("response is not a JSON object".to_string()))?
        .get(key)
        .ok_or_else(|| Error::Oracle(format!("response has no \"{}\" field", key)))?
        .as_array()
        .ok_or_else(|| Error::Oracle(format!("\"{}\" is not an array", key)))?;

    Ok(entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match serde_json::from_value::<T>(entry.clone()) {
            Ok(value) => OracleEntry::Valid(value),
            Err(e) => OracleEntry::Malformed {
                index,
                reason: e.to_string(),
            },
        })
        .collect())
}

fn parse_document(response: &str) -> Result<Value> {
    let json = extract_json(response).ok_or_else(|| {
        Error::Oracle(format!(
            "no JSON object in response ({} bytes)",
            response.len()
        ))
    })?;
    serde_json::from_str(json).map_err(|e| Error::Oracle(format!("invalid JSON: {}", e)))
}

fn keep_valid<T>(entries: Vec<OracleEntry<T>>, op: &str) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            OracleEntry::Valid(value) => Some(value),
            OracleEntry::Malformed { index, reason } => {
                warn!(
                    subsystem = "inference",
                    component = "oracle",
                    op,
                    index,
                    reason = %reason,
                    "Dropping malformed oracle entry"
                );
                None
            }
        })
        .collect()
}

/// Taxonomy oracle that delegates reasoning to an LLM.
pub struct LlmOracle<G> {
    backend: G,
}

impl<G: GenerationBackend> LlmOracle<G> {
    pub fn new(backend: G) -> Self {
        Self { backend }
    }

    async fn ask(&self, system: &str, payload: &Value) -> Result<Value> {
        let prompt = serde_json::to_string_pretty(payload)?;
        let start = Instant::now();
        let response = self
            .backend
            .generate_json_with_system(system, &prompt)
            .await?;
        debug!(
            prompt_len = prompt.len(),
            response_len = response.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Oracle responded"
        );
        parse_document(&response)
    }
}

#[async_trait]
impl<G: GenerationBackend> TaxonomyOracle for LlmOracle<G> {
    #[instrument(skip(self, clusters), fields(subsystem = "inference", component = "oracle", op = "merge_similar_clusters", model = %self.backend.model_name(), input_count = clusters.len()))]
    async fn merge_similar_clusters(
        &self,
        clusters: &[ClusterSummary],
    ) -> Result<ClusterMergeResponse> {
        if clusters.len() < 2 {
            return Ok(ClusterMergeResponse::default());
        }
        let document = self
            .ask(MERGE_SYSTEM_PROMPT, &serde_json::json!({ "clusters": clusters }))
            .await?;
        let merges = keep_valid(
            decode_entries::<ClusterMergeProposal>(&document, "merges")?,
            "merge_similar_clusters",
        );
        Ok(ClusterMergeResponse { merges })
    }

    #[instrument(skip(self, category_names), fields(subsystem = "inference", component = "oracle", op = "create_category_hierarchy", model = %self.backend.model_name(), input_count = category_names.len()))]
    async fn create_category_hierarchy(
        &self,
        category_names: &[String],
    ) -> Result<HierarchyProposal> {
        if category_names.is_empty() {
            return Ok(HierarchyProposal::default());
        }
        let document = self
            .ask(
                HIERARCHY_SYSTEM_PROMPT,
                &serde_json::json!({ "categories": category_names }),
            )
            .await?;
        let parents = keep_valid(
            decode_entries::<ProposedParent>(&document, "parents")?,
            "create_category_hierarchy",
        );
        Ok(HierarchyProposal { parents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGenerationBackend;

    fn summaries() -> Vec<ClusterSummary> {
        vec![
            ClusterSummary {
                id: "Street Food".to_string(),
                categories: vec!["Street Food".to_string()],
                post_count: 12,
            },
            ClusterSummary {
                id: "Food Stalls".to_string(),
                categories: vec!["Food Stalls".to_string()],
                post_count: 4,
            },
        ]
    }

    #[test]
    fn test_extract_json_strips_fences() {
        let raw = "```json\n{\"merges\": []}\n```";
        assert_eq!(extract_json(raw), Some("{\"merges\": []}"));
    }

    #[test]
    fn test_extract_json_strips_prose() {
        let raw = "Sure! Here you go: {\"parents\": [{\"name\": \"A\"}]} Hope that helps.";
        assert_eq!(extract_json(raw), Some("{\"parents\": [{\"name\": \"A\"}]}"));
    }

    #[test]
    fn test_extract_json_none_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_decode_entries_drops_only_bad_entries() {
        let doc = serde_json::json!({
            "merges": [
                {"clusterIds": ["a", "b"], "canonicalName": "Food"},
                {"clusterIds": "a", "canonicalName": "Broken"},
                {"canonicalName": "Missing ids"}
            ]
        });
        let entries = decode_entries::<ClusterMergeProposal>(&doc, "merges").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], OracleEntry::Valid(_)));
        assert!(matches!(entries[1], OracleEntry::Malformed { index: 1, .. }));
        assert!(matches!(entries[2], OracleEntry::Malformed { index: 2, .. }));
    }

    #[test]
    fn test_decode_entries_rejects_wrong_shape() {
        let not_object = serde_json::json!([1, 2]);
        assert!(matches!(
            decode_entries::<ProposedParent>(&not_object, "parents"),
            Err(Error::Oracle(_))
        ));

        let wrong_key = serde_json::json!({"groups": []});
        assert!(matches!(
            decode_entries::<ProposedParent>(&wrong_key, "parents"),
            Err(Error::Oracle(_))
        ));

        let not_array = serde_json::json!({"parents": {"name": "A"}});
        assert!(matches!(
            decode_entries::<ProposedParent>(&not_array, "parents"),
            Err(Error::Oracle(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_decodes_valid_entries() {
        let backend = MockGenerationBackend::new().with_response(
            r#"```json
            {"merges": [
                {"clusterIds": ["Street Food", "Food Stalls"], "canonicalName": "Street Food", "reason": "same"},
                {"clusterIds": 7}
            ]}
            ```"#,
        );
        let oracle = LlmOracle::new(backend.clone());

        let response = oracle.merge_similar_clusters(&summaries()).await.unwrap();
        assert_eq!(response.merges.len(), 1);
        assert_eq!(response.merges[0].canonical_name, "Street Food");
        assert_eq!(backend.call_count(), 1);
        assert!(backend.last_prompt().unwrap().contains("Food Stalls"));
    }

    #[tokio::test]
    async fn test_merge_garbage_is_oracle_error() {
        let backend = MockGenerationBackend::new().with_response("I cannot help with that.");
        let oracle = LlmOracle::new(backend);

        let err = oracle.merge_similar_clusters(&summaries()).await.unwrap_err();
        assert!(matches!(err, Error::Oracle(_)));
    }

    #[tokio::test]
    async fn test_merge_skips_call_for_single_cluster() {
        let backend = MockGenerationBackend::new();
        let oracle = LlmOracle::new(backend.clone());

        let response = oracle
            .merge_similar_clusters(&summaries()[..1])
            .await
            .unwrap();
        assert!(response.merges.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_hierarchy_decodes_parents() {
        let backend = MockGenerationBackend::new().with_response(
            r#"{"parents": [
                {"name": "Food", "children": ["Street Food", "Desserts"], "reason": "eating"},
                {"name": "Broken", "children": "Street Food"}
            ]}"#,
        );
        let oracle = LlmOracle::new(backend);

        let names = vec!["Street Food".to_string(), "Desserts".to_string()];
        let proposal = oracle.create_category_hierarchy(&names).await.unwrap();
        assert_eq!(proposal.parents.len(), 1);
        assert_eq!(proposal.parents[0].children, vec!["Street Food", "Desserts"]);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend = MockGenerationBackend::new().failing();
        let oracle = LlmOracle::new(backend);

        let err = oracle
            .create_category_hierarchy(&["Travel".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_external());
    }
}

//! Mock backends for deterministic testing.
//!
//! - [`MockEmbeddingBackend`] maps names to fixed vectors.
//! - [`MockGenerationBackend`] returns a canned response.
//! - [`ScriptedOracle`] returns fixed merge and hierarchy proposals.
//!
//! All of them record their calls for assertions.
//!
//! ```rust,ignore
//! use strata_inference::mock::MockEmbeddingBackend;
//!
//! let embedder = MockEmbeddingBackend::new(2)
//!     .with_vector("Travel", vec![1.0, 0.0])
//!     .with_vector("Trips", vec![0.9, 0.1]);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use strata_core::{
    ClusterMergeResponse, ClusterSummary, EmbeddingBackend, Error, GenerationBackend,
    HierarchyProposal, Result, TaxonomyOracle, Vector,
};

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[derive(Debug, Clone, Default)]
struct MockEmbeddingConfig {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    /// Number of leading calls that fail before the backend recovers.
    failures: usize,
}

/// Embedding backend backed by an explicit name -> vector table.
///
/// Unknown names embed to the zero vector, which is similar to nothing.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<MockEmbeddingConfig>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            config: Arc::new(MockEmbeddingConfig {
                dimension,
                ..Default::default()
            }),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_vector(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .vectors
            .insert(name.into(), vector);
        self
    }

    /// Fail the first `n` calls with `Error::Embedding`.
    pub fn failing_first(mut self, n: usize) -> Self {
        Arc::make_mut(&mut self.config).failures = n;
        self
    }

    /// Fail every call.
    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Inputs of every call so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Total number of texts embedded across calls.
    pub fn embedded_count(&self) -> usize {
        self.calls.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(texts.to_vec());
            calls.len()
        };
        if call_index <= self.config.failures {
            return Err(Error::Embedding("mock embedding failure".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let vector = self
                    .config
                    .vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.config.dimension]);
                Vector::from(vector)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// GENERATION
// =============================================================================

/// Generation backend returning one canned response.
#[derive(Clone)]
pub struct MockGenerationBackend {
    response: Arc<String>,
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self {
            response: Arc::new("{}".to_string()),
            fail: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Arc::new(response.into());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(Error::Inference("mock generation failure".to_string()));
        }
        Ok(self.response.as_ref().clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

// =============================================================================
// ORACLE
// =============================================================================

#[derive(Debug, Default)]
struct OracleLog {
    merge_inputs: Vec<Vec<ClusterSummary>>,
    hierarchy_inputs: Vec<Vec<String>>,
}

/// Oracle returning fixed proposals and recording what it was asked.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
    merges: ClusterMergeResponse,
    hierarchy: HierarchyProposal,
    fail_merges: bool,
    fail_hierarchy: bool,
    log: Arc<Mutex<OracleLog>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merges(mut self, merges: ClusterMergeResponse) -> Self {
        self.merges = merges;
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: HierarchyProposal) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn failing_merges(mut self) -> Self {
        self.fail_merges = true;
        self
    }

    pub fn failing_hierarchy(mut self) -> Self {
        self.fail_hierarchy = true;
        self
    }

    pub fn merge_inputs(&self) -> Vec<Vec<ClusterSummary>> {
        self.log.lock().unwrap().merge_inputs.clone()
    }

    pub fn hierarchy_inputs(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().hierarchy_inputs.clone()
    }

    /// Total oracle calls of either kind.
    pub fn call_count(&self) -> usize {
        let log = self.log.lock().unwrap();
        log.merge_inputs.len() + log.hierarchy_inputs.len()
    }
}

#[async_trait]
impl TaxonomyOracle for ScriptedOracle {
    async fn merge_similar_clusters(
        &self,
        clusters: &[ClusterSummary],
    ) -> Result<ClusterMergeResponse> {
        self.log
            .lock()
            .unwrap()
            .merge_inputs
            .push(clusters.to_vec());
        if self.fail_merges {
            return Err(Error::Oracle("scripted merge failure".to_string()));
        }
        Ok(self.merges.clone())
    }

    async fn create_category_hierarchy(
        &self,
        category_names: &[String],
    ) -> Result<HierarchyProposal> {
        self.log
            .lock()
            .unwrap()
            .hierarchy_inputs
            .push(category_names.to_vec());
        if self.fail_hierarchy {
            return Err(Error::Oracle("scripted hierarchy failure".to_string()));
        }
        Ok(self.hierarchy.clone())
    }
}

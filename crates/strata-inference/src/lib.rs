//! # strata-inference
//!
//! Inference backends for strata taxonomy consolidation.
//!
//! This crate provides:
//! - Ollama embedding and generation backend (default feature `ollama`)
//! - Batch-level embedding retry with exponential backoff
//! - [`LlmOracle`], the LLM-backed merge and hierarchy oracle
//! - Mock backends (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_inference::{LlmOracle, OllamaBackend};
//! use strata_core::TaxonomyOracle;
//!
//! #[tokio::main]
//! async fn main() {
//!     let oracle = LlmOracle::new(OllamaBackend::from_env());
//!     let names = vec!["Street Food".to_string(), "Desserts".to_string()];
//!     let proposal = oracle.create_category_hierarchy(&names).await.unwrap();
//!     println!("{} parents proposed", proposal.parents.len());
//! }
//! ```

pub mod oracle;
pub mod retry;

#[cfg(feature = "ollama")]
pub mod ollama;

// Mock backends for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use strata_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

pub use oracle::{decode_entries, extract_json, LlmOracle, OracleEntry};
pub use retry::{embed_with_retry, RetryPolicy};

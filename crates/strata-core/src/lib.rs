//! # strata-core
//!
//! Core types, traits, and text algorithms for strata taxonomy consolidation.
//!
//! This crate provides the data model, the collaborator contracts (category
//! store, embedding service, reasoning oracle) and the deterministic label
//! algorithms that the other strata crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod similarity;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use similarity::{best_match, cosine_similarity};
pub use text::{
    format_category_name, has_plural_suffix, normalize, sanitize_label, stem, title_case,
    to_hashtag,
};
pub use traits::*;

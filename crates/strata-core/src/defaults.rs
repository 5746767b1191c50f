//! Centralized default constants for strata.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// CLUSTERING
// =============================================================================

/// Cosine similarity at or above which a category joins a cluster seed.
pub const CLUSTER_SIMILARITY_THRESHOLD: f32 = 0.78;

/// Name given to a category whose label sanitizes to nothing.
pub const FALLBACK_CATEGORY_NAME: &str = "General";

/// Prefix of the catch-all child synthesized under each parent.
pub const OTHER_CATEGORY_PREFIX: &str = "Other";

// =============================================================================
// BATCHING
// =============================================================================

/// Categories converted to hashtags concurrently per batch.
pub const HASHTAG_BATCH_SIZE: usize = 50;

/// Low-count categories soft-deleted concurrently per batch.
pub const DELETE_BATCH_SIZE: usize = 50;

/// Category names sent to the embedding service per request.
pub const EMBED_BATCH_SIZE: usize = 100;

/// Merge actions executed concurrently per batch.
pub const MERGE_BATCH_SIZE: usize = 20;

/// Renames executed concurrently per batch during casing normalization.
pub const RENAME_BATCH_SIZE: usize = 50;

// =============================================================================
// RUN DEFAULTS
// =============================================================================

/// Default minimum post count for a category to survive.
pub const MIN_POST_THRESHOLD: i64 = 3;

/// Number of recent step messages kept in the run state.
pub const RUN_LOG_CAPACITY: usize = 200;

/// Default directory for pre-mutation backups.
pub const BACKUP_DIR: &str = "./backups";

/// Broadcast channel capacity for run events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests in seconds. Oracle calls see every
/// category name at once, so this is generous.
pub const GEN_TIMEOUT_SECS: u64 = 300;

/// Retries for a failed embedding batch before the run aborts.
pub const EMBED_MAX_RETRIES: u32 = 3;

/// Base delay for embedding retry backoff in milliseconds.
pub const EMBED_RETRY_BASE_MS: u64 = 500;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_threshold_in_range() {
        assert!(CLUSTER_SIMILARITY_THRESHOLD > 0.0 && CLUSTER_SIMILARITY_THRESHOLD < 1.0);
        assert_eq!(CLUSTER_SIMILARITY_THRESHOLD, 0.78);
    }

    #[test]
    fn test_batch_sizes_are_bounded() {
        for size in [
            HASHTAG_BATCH_SIZE,
            DELETE_BATCH_SIZE,
            EMBED_BATCH_SIZE,
            MERGE_BATCH_SIZE,
            RENAME_BATCH_SIZE,
        ] {
            assert!(size >= 10 && size <= 100, "batch size {} out of range", size);
        }
    }
}

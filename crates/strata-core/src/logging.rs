//! Structured logging field name constants for strata.
//!
//! All crates use these constants for consistent structured logging fields so
//! a cleanup run can be followed across store, inference and pipeline logs.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run aborted, requires operator attention (restore from backup) |
//! | WARN  | Per-item failure skipped, oracle entry dropped, retry scheduled |
//! | INFO  | Run lifecycle, step completions with counts |
//! | DEBUG | Decision points (survivor choice, cluster seeds, parent skips) |
//! | TRACE | Per-item iteration (individual edge moves, hashtag writes) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pipeline", "runner", "ollama", "oracle", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "embed_texts", "merge_similar_clusters", "reassign_posts"
pub const OPERATION: &str = "op";

/// Cleanup run UUID.
pub const RUN_ID: &str = "run_id";

/// Pipeline step key (see `CleanupStep::key`).
pub const STEP: &str = "step";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Category UUID being operated on.
pub const CATEGORY_ID: &str = "category_id";

/// Post UUID being operated on.
pub const POST_ID: &str = "post_id";

/// Category display name.
pub const CATEGORY_NAME: &str = "category_name";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Number of results produced by a step or query.
pub const RESULT_COUNT: &str = "result_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

/// Retry attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

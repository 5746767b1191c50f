//! # strata-jobs
//!
//! The taxonomy consolidation pipeline for strata.
//!
//! This crate provides:
//! - [`CleanupPipeline`]: analyze, back up, delete low-count categories into
//!   hashtags, normalize names, merge stem and semantic duplicates, repair
//!   orphaned posts and apply an oracle-proposed hierarchy
//! - [`CleanupRunner`]: the single background run with status polling and a
//!   broadcast event stream
//! - Backup writing, loading and manual restore
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_jobs::{CleanupPipeline, CleanupRunner, PipelineConfig};
//!
//! let pipeline = CleanupPipeline::new(store, embedder, oracle)
//!     .with_config(PipelineConfig::from_env());
//! let runner = CleanupRunner::new(pipeline);
//! let run_id = runner.start(RunConfig::new(3))?;
//! println!("{:?}", runner.status().status);
//! ```

pub mod backup;
pub mod context;
pub mod pipeline;
pub mod runner;
pub mod state;
pub mod steps;

pub use backup::{load_backup, restore_backup, write_backup};
pub use context::{ProgressSink, RunContext};
pub use pipeline::{CleanupPipeline, PipelineConfig};
pub use runner::CleanupRunner;
pub use state::{CleanupStep, RunEvent, RunState, RunStatus};

// Re-export core types
pub use strata_core::*;

//! Pipeline steps, run status and the externally visible run state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use strata_core::RunSummary;

/// One state of the cleanup state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStep {
    Analyze,
    Backup,
    ConvertToHashtags,
    DeleteLowCount,
    NormalizeCasing,
    PreClusterByStem,
    ExecutePreClusterMerges,
    GenerateEmbeddings,
    RepairOrphans,
    ClusterByEmbedding,
    OracleMergeClusters,
    ExecuteSemanticMerges,
    OracleBuildHierarchy,
    ApplyHierarchy,
    HandleOrphanParentPosts,
    Done,
}

impl CleanupStep {
    /// Every step in order, `Done` last.
    pub const ALL: [CleanupStep; 16] = [
        CleanupStep::Analyze,
        CleanupStep::Backup,
        CleanupStep::ConvertToHashtags,
        CleanupStep::DeleteLowCount,
        CleanupStep::NormalizeCasing,
        CleanupStep::PreClusterByStem,
        CleanupStep::ExecutePreClusterMerges,
        CleanupStep::GenerateEmbeddings,
        CleanupStep::RepairOrphans,
        CleanupStep::ClusterByEmbedding,
        CleanupStep::OracleMergeClusters,
        CleanupStep::ExecuteSemanticMerges,
        CleanupStep::OracleBuildHierarchy,
        CleanupStep::ApplyHierarchy,
        CleanupStep::HandleOrphanParentPosts,
        CleanupStep::Done,
    ];

    /// Number of working steps before `Done`.
    pub const TOTAL_STEPS: usize = Self::ALL.len() - 1;

    /// Stable key used in logs, progress callbacks and the status API.
    pub fn key(&self) -> &'static str {
        match self {
            CleanupStep::Analyze => "analyze",
            CleanupStep::Backup => "backup",
            CleanupStep::ConvertToHashtags => "convert_to_hashtags",
            CleanupStep::DeleteLowCount => "delete_low_count",
            CleanupStep::NormalizeCasing => "normalize_casing",
            CleanupStep::PreClusterByStem => "pre_cluster_by_stem",
            CleanupStep::ExecutePreClusterMerges => "execute_pre_cluster_merges",
            CleanupStep::GenerateEmbeddings => "generate_embeddings",
            CleanupStep::RepairOrphans => "repair_orphans",
            CleanupStep::ClusterByEmbedding => "cluster_by_embedding",
            CleanupStep::OracleMergeClusters => "oracle_merge_clusters",
            CleanupStep::ExecuteSemanticMerges => "execute_semantic_merges",
            CleanupStep::OracleBuildHierarchy => "oracle_build_hierarchy",
            CleanupStep::ApplyHierarchy => "apply_hierarchy",
            CleanupStep::HandleOrphanParentPosts => "handle_orphan_parent_posts",
            CleanupStep::Done => "done",
        }
    }

    /// Human-readable progress message shown while the step runs.
    pub fn message(&self) -> &'static str {
        match self {
            CleanupStep::Analyze => "Analyzing categories",
            CleanupStep::Backup => "Backing up taxonomy",
            CleanupStep::ConvertToHashtags => "Converting low-count categories to hashtags",
            CleanupStep::DeleteLowCount => "Deleting low-count categories",
            CleanupStep::NormalizeCasing => "Normalizing category casing",
            CleanupStep::PreClusterByStem => "Grouping categories by stem",
            CleanupStep::ExecutePreClusterMerges => "Merging stem duplicates",
            CleanupStep::GenerateEmbeddings => "Generating category embeddings",
            CleanupStep::RepairOrphans => "Reassigning orphaned posts",
            CleanupStep::ClusterByEmbedding => "Clustering categories by similarity",
            CleanupStep::OracleMergeClusters => "Asking oracle which clusters to merge",
            CleanupStep::ExecuteSemanticMerges => "Merging similar categories",
            CleanupStep::OracleBuildHierarchy => "Asking oracle for a hierarchy",
            CleanupStep::ApplyHierarchy => "Applying category hierarchy",
            CleanupStep::HandleOrphanParentPosts => "Filing posts linked only to parents",
            CleanupStep::Done => "Cleanup complete",
        }
    }

    /// Zero-based position in [`CleanupStep::ALL`].
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// `index * 100 / TOTAL_STEPS`; `Done` is 100.
    pub fn percent(&self) -> u8 {
        (self.index() * 100 / Self::TOTAL_STEPS).min(100) as u8
    }
}

impl std::fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Lifecycle of the single cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Snapshot of the current (or last) run, served to status pollers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub step: Option<String>,
    pub message: Option<String>,
    pub percent: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
    /// Most recent progress lines, oldest first.
    pub log: VecDeque<String>,
}

impl RunState {
    /// Fresh state for a run that is starting now.
    pub fn starting(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            status: RunStatus::Running,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Record a progress line, dropping the oldest past `capacity`.
    pub fn push_progress(&mut self, step: &str, message: &str, percent: u8, capacity: usize) {
        self.step = Some(step.to_string());
        self.message = Some(message.to_string());
        self.percent = percent;
        self.log.push_back(format!("[{}] {}", step, message));
        while self.log.len() > capacity {
            self.log.pop_front();
        }
    }
}

/// Push notification emitted by the runner alongside state updates.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        run_id: Uuid,
    },
    Progress {
        run_id: Uuid,
        step: String,
        message: String,
        percent: u8,
    },
    Completed {
        run_id: Uuid,
        summary: RunSummary,
    },
    Failed {
        run_id: Uuid,
        step: Option<String>,
        error: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::Started { run_id }
            | RunEvent::Progress { run_id, .. }
            | RunEvent::Completed { run_id, .. }
            | RunEvent::Failed { run_id, .. } => *run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Completed { .. } | RunEvent::Failed { .. })
    }
}

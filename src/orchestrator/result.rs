//! Terminal result types for an orchestration run.

use serde::{Deserialize, Serialize};

use crate::worker::{WorkerFailure, WorkerFailureKind, WorkerId};

/// Terminal status of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestrationStatus {
    /// Every stage completed with no worker failures
    Success,
    /// Some work completed; failures or an abort cut the run short
    PartialSuccess,
    /// Nothing useful completed
    Failed,
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrchestrationStatus::Success => "success",
            OrchestrationStatus::PartialSuccess => "partial_success",
            OrchestrationStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Aggregated output of one completed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Zero-based stage index within the plan
    pub stage: usize,
    /// Caller-defined reduction of the stage's successful worker outputs
    pub aggregated: serde_json::Value,
}

/// One failure carried into the final result.
///
/// `worker` is `None` for plan-time failures (an unfundable plan has no
/// workers to blame).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub worker: Option<WorkerId>,
    pub kind: WorkerFailureKind,
    pub detail: String,
}

impl FailureEntry {
    pub fn plan_time(kind: WorkerFailureKind, detail: impl Into<String>) -> Self {
        Self {
            worker: None,
            kind,
            detail: detail.into(),
        }
    }

    pub fn for_worker(worker: WorkerId, kind: WorkerFailureKind, detail: impl Into<String>) -> Self {
        Self {
            worker: Some(worker),
            kind,
            detail: detail.into(),
        }
    }
}

impl From<WorkerFailure> for FailureEntry {
    fn from(f: WorkerFailure) -> Self {
        Self {
            worker: Some(f.worker),
            kind: f.kind,
            detail: f.detail,
        }
    }
}

/// Terminal aggregate returned to the caller.
///
/// Expected failure modes (budget exhaustion, worker timeout, dependency
/// failure) always surface here as structured data, never as a bare
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub session_id: crate::session::SessionId,
    pub status: OrchestrationStatus,

    /// Aggregated outputs of completed stages, in stage order
    pub stage_results: Vec<StageResult>,

    /// Budget actually committed over the whole run
    pub total_budget_consumed: u64,

    /// Every failure observed, worker-level and plan-level
    pub failures: Vec<FailureEntry>,

    /// Specialist the task was routed to, when the policy ruled the task
    /// domain-specific
    pub routed_to: Option<String>,
}

impl OrchestrationResult {
    pub fn is_success(&self) -> bool {
        self.status == OrchestrationStatus::Success
    }
}

//! Session persistence with pluggable backends.
//!
//! Supports:
//! - `memory`: in-memory storage (non-persistent, for tests)
//! - `file`: one JSON document per session on disk
//!
//! The orchestrator re-saves the full in-progress state after every
//! stage completion, idempotently, so an interrupted session can resume
//! from the last completed stage instead of re-running it.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orchestrator::{FailureEntry, OrchestrationStatus, StageResult};
use crate::planner::Plan;
use crate::task::Task;
use crate::worker::WorkerRecord;

/// Unique identifier for an orchestration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a persisted session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Stages still outstanding; eligible for resume
    InProgress,
    /// Run reached a terminal status
    Finished(OrchestrationStatus),
}

/// Full persisted state of one orchestration session: the plan, every
/// worker's terminal record, completed stage outputs, and budget
/// consumption. This is the orchestration-result-in-progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub task: Task,
    pub plan: Plan,
    pub phase: SessionPhase,

    /// Aggregated outputs of stages that fully completed, in order
    pub completed_stages: Vec<StageResult>,

    /// Terminal snapshots of every worker finalized so far
    pub worker_records: Vec<WorkerRecord>,

    /// Failure detail accumulated so far
    pub failures: Vec<FailureEntry>,

    /// Budget committed so far
    pub consumed_budget: u64,

    pub updated_at: DateTime<Utc>,
}

/// Errors from session persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Session store trait - implemented by all storage backends.
///
/// The core only requires at-least-once durability for the last-saved
/// state per session id; `save` must be safe to call repeatedly with
/// the same id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Persist the full session state, replacing any previous save.
    async fn save(&self, state: &SessionState) -> Result<(), SessionError>;

    /// Load the last-saved state for a session.
    async fn load(&self, id: SessionId) -> Result<SessionState, SessionError>;
}

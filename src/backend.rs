//! Boundary contracts with out-of-scope collaborators.
//!
//! The core treats "run a unit of work" as an opaque operation with a
//! result and a resource cost. Whether that is language-model reasoning,
//! a tool call, or a domain-specialist routine is the backend's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Task;
use crate::worker::{WorkerContext, WorkerSpec};

/// Outcome of one opaque execution operation.
///
/// `cost` is reported even when the operation errored, so partial
/// consumption is always accounted for.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: Result<serde_json::Value, anyhow::Error>,
    pub cost: u64,
}

impl ExecutionOutcome {
    pub fn success(output: serde_json::Value, cost: u64) -> Self {
        Self {
            result: Ok(output),
            cost,
        }
    }

    pub fn failure(error: impl Into<anyhow::Error>, cost: u64) -> Self {
        Self {
            result: Err(error.into()),
            cost,
        }
    }
}

/// The injected execution operation.
///
/// # Contract
/// - Must observe `ctx.cancel` and unwind promptly when it fires.
/// - Must report a cost even on error.
/// - Must stay within `ctx.budget_allotment`; a reported cost above the
///   allotment is treated as a force-stop and the worker is failed.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, spec: &WorkerSpec, ctx: &WorkerContext) -> ExecutionOutcome;
}

/// Routes domain-specific tasks to an external specialist.
///
/// Consulted when the delegation policy rules that the task needs a
/// capability outside the orchestrator's generic competence; the core
/// never executes such tasks itself.
#[async_trait]
pub trait SpecialistRouter: Send + Sync {
    /// Resolve the specialist that should own this task.
    async fn route(&self, task: &Task) -> anyhow::Result<String>;
}

/// One lesson recorded after an orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    /// Task category key (derived from the task's declared shape)
    pub category: String,
    /// Free-form summary of what the run taught us
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

impl Lesson {
    pub fn new(category: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            summary: summary.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only log of lessons, keyed by task category.
///
/// Written post-hoc by the orchestrator; not part of the core state
/// machine, so failures here are logged and swallowed.
#[async_trait]
pub trait LessonLog: Send + Sync {
    async fn append(&self, lesson: Lesson) -> anyhow::Result<()>;
}

/// In-memory lesson log for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryLessonLog {
    lessons: tokio::sync::Mutex<Vec<Lesson>>,
}

impl InMemoryLessonLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lessons(&self) -> Vec<Lesson> {
        self.lessons.lock().await.clone()
    }
}

#[async_trait]
impl LessonLog for InMemoryLessonLog {
    async fn append(&self, lesson: Lesson) -> anyhow::Result<()> {
        self.lessons.lock().await.push(lesson);
        Ok(())
    }
}

//! Declarative worker specifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a clone worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Create a new unique worker ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How much of the session context a worker is granted at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContextScope {
    /// Full copy of the working context
    #[default]
    Full,
    /// Only the worker's own instruction and dependency outputs
    Scoped,
}

/// Declarative description of one unit of delegated execution.
///
/// Worker IDs are assigned at plan-build time so later stages can
/// declare dependencies on specific prior-stage workers before any of
/// them has been spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Pre-assigned ID of the worker this spec will become
    pub id: WorkerId,

    /// Instruction handed to the execution backend; opaque to the core
    pub instruction: String,

    /// Context granted at spawn time
    pub context_scope: ContextScope,

    /// Resource units reserved for this worker
    pub budget_allotment: u64,

    /// Workers from a prior stage whose outputs this spec consumes;
    /// empty for stage 1
    pub depends_on: Vec<WorkerId>,

    /// This spec's estimated share of the task's steps (allotment weight)
    pub step_share: f64,

    /// Delegation depth this worker runs at; a backend that delegates
    /// recursively plans its nested stages at this depth
    pub nesting_depth: u32,
}

impl WorkerSpec {
    /// Create a spec with a fresh worker ID and no dependencies.
    pub fn new(instruction: impl Into<String>, budget_allotment: u64) -> Self {
        Self {
            id: WorkerId::new(),
            instruction: instruction.into(),
            context_scope: ContextScope::Full,
            budget_allotment,
            depends_on: Vec::new(),
            step_share: 1.0,
            nesting_depth: 0,
        }
    }

    pub fn with_scope(mut self, scope: ContextScope) -> Self {
        self.context_scope = scope;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<WorkerId>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_step_share(mut self, share: f64) -> Self {
        self.step_share = share.max(0.01);
        self
    }

    pub fn with_nesting_depth(mut self, depth: u32) -> Self {
        self.nesting_depth = depth;
        self
    }
}

//! Worker lifecycle state machine.
//!
//! # State Machine
//! ```text
//! Pending -> Initializing -> Running -> Succeeded \
//!                        \            -> Failed    >-> Cleaned
//!                         \           -> TimedOut /
//!                          \-> Failed (initialization error)
//! ```
//!
//! `Succeeded`/`Failed`/`TimedOut` are observable-but-pending-cleanup
//! states; `Cleaned` is the only true terminal state. No transition
//! skips intermediate states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spec::{WorkerId, WorkerSpec};

/// Lifecycle state of a clone worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Admitted to a plan but not yet funded/spawned
    Pending,
    /// Budget reserved; context being assembled
    Initializing,
    /// Opaque execution operation in flight
    Running,
    /// Execution returned a result within budget and timeout
    Succeeded,
    /// Execution errored, overspent, or never initialized
    Failed,
    /// Wall-clock allowance elapsed before completion
    TimedOut,
    /// Resources released and outcome persisted
    Cleaned,
}

impl WorkerState {
    /// Whether the worker has reached an observable outcome.
    ///
    /// # Property
    /// `is_terminal() => no further execution will occur`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Succeeded | WorkerState::Failed | WorkerState::TimedOut
        )
    }

    /// Whether the transition `self -> next` is allowed.
    fn can_transition(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Pending, Initializing)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Succeeded, Cleaned)
                | (Failed, Cleaned)
                | (TimedOut, Cleaned)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Pending => "pending",
            WorkerState::Initializing => "initializing",
            WorkerState::Running => "running",
            WorkerState::Succeeded => "succeeded",
            WorkerState::Failed => "failed",
            WorkerState::TimedOut => "timed_out",
            WorkerState::Cleaned => "cleaned",
        };
        write!(f, "{}", s)
    }
}

/// Why a worker ended in a failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerFailureKind {
    /// Context assembly failed before the worker started running
    InitializationError,
    /// The opaque execute operation returned an error
    ExecutionError,
    /// The worker would have overspent its reservation and was force-stopped
    BudgetExceeded,
    /// Wall-clock allowance elapsed; cooperative cancellation was attempted
    TimeoutExceeded,
    /// A depended-upon prior-stage output never materialized
    DependencyUnmet,
    /// The whole session was cancelled while this worker was in flight
    Cancelled,
}

impl std::fmt::Display for WorkerFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerFailureKind::InitializationError => "initialization_error",
            WorkerFailureKind::ExecutionError => "execution_error",
            WorkerFailureKind::BudgetExceeded => "budget_exceeded",
            WorkerFailureKind::TimeoutExceeded => "timeout_exceeded",
            WorkerFailureKind::DependencyUnmet => "dependency_unmet",
            WorkerFailureKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Failure detail for one worker, carried into the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker: WorkerId,
    pub kind: WorkerFailureKind,
    pub detail: String,
}

impl WorkerFailure {
    pub fn new(worker: WorkerId, kind: WorkerFailureKind, detail: impl Into<String>) -> Self {
        Self {
            worker,
            kind,
            detail: detail.into(),
        }
    }
}

/// A running or completed instance of a `WorkerSpec`.
///
/// Mutated only by the orchestrator driving its lifecycle; sibling
/// workers never touch each other's handles. After the result is
/// aggregated and persisted the in-memory handle is dropped, and only
/// the `WorkerRecord` snapshot survives in the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHandle {
    id: WorkerId,
    spec: WorkerSpec,
    state: WorkerState,
    consumed_budget: u64,
    output: Option<serde_json::Value>,
    error: Option<WorkerFailure>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl WorkerHandle {
    /// Create a handle for an admitted spec, in `Pending` state.
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            id: spec.id,
            state: WorkerState::Pending,
            consumed_budget: 0,
            output: None,
            error: None,
            started_at: None,
            ended_at: None,
            spec,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn consumed_budget(&self) -> u64 {
        self.consumed_budget
    }

    pub fn output(&self) -> Option<&serde_json::Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&WorkerFailure> {
        self.error.as_ref()
    }

    fn transition(&mut self, next: WorkerState) -> Result<(), WorkerError> {
        if !self.state.can_transition(next) {
            return Err(WorkerError::InvalidTransition {
                worker: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// `Pending -> Initializing`: budget reservation succeeded.
    pub fn admit(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Initializing)
    }

    /// `Initializing -> Running`: context assembled, execution begins.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Succeeded` with the execution output and measured cost.
    pub fn succeed(&mut self, output: serde_json::Value, cost: u64) -> Result<(), WorkerError> {
        self.transition(WorkerState::Succeeded)?;
        self.output = Some(output);
        self.consumed_budget = cost;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// `Initializing|Running -> Failed` with a failure reason and the
    /// partial cost incurred before the failure.
    pub fn fail(
        &mut self,
        kind: WorkerFailureKind,
        detail: impl Into<String>,
        cost: u64,
    ) -> Result<(), WorkerError> {
        self.transition(WorkerState::Failed)?;
        self.error = Some(WorkerFailure::new(self.id, kind, detail));
        self.consumed_budget = cost;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> TimedOut`: wall-clock allowance elapsed.
    ///
    /// Aggregated like a failure but logged distinctly.
    pub fn time_out(&mut self, cost: u64) -> Result<(), WorkerError> {
        self.transition(WorkerState::TimedOut)?;
        self.error = Some(WorkerFailure::new(
            self.id,
            WorkerFailureKind::TimeoutExceeded,
            "wall-clock timeout elapsed",
        ));
        self.consumed_budget = cost;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal state `-> Cleaned`: reservations settled, outcome persisted.
    pub fn mark_cleaned(&mut self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Cleaned)
    }

    /// Snapshot for persistence; survives after the handle is dropped.
    pub fn record(&self) -> WorkerRecord {
        WorkerRecord {
            id: self.id,
            instruction: self.spec.instruction.clone(),
            state: self.state,
            consumed_budget: self.consumed_budget,
            output: self.output.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Persisted terminal snapshot of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub instruction: String,
    pub state: WorkerState,
    pub consumed_budget: u64,
    pub output: Option<serde_json::Value>,
    pub error: Option<WorkerFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Contract violations in worker lifecycle handling.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker {worker}: invalid state transition from {from} to {to}")]
    InvalidTransition {
        worker: WorkerId,
        from: WorkerState,
        to: WorkerState,
    },
}

//! Core Task type with declared complexity signals.
//!
//! # Invariants
//! - `uncertainty` is within `[0.0, 1.0]`
//! - `estimated_steps >= 1`
//! - `id` is unique within an orchestration session

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
///
/// # Properties
/// - Globally unique within an execution context
/// - Immutable once created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared shape of a task: the complexity signals the caller provides
/// at submission time.
///
/// The orchestration core never inspects `Task::description`; every
/// delegation decision is driven by these declared signals alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskShape {
    /// Estimated number of discrete steps to complete the task
    pub estimated_steps: u32,

    /// Number of items (files, records, targets) the task touches
    pub affected_item_count: u32,

    /// Whether the affected items can be worked on independently
    pub parallelizable: bool,

    /// True if the task requires a specialist capability outside the
    /// orchestrator's generic competence
    pub domain_specific: bool,

    /// Caller confidence inverse, in `[0.0, 1.0]`
    pub uncertainty: f64,
}

impl Default for TaskShape {
    fn default() -> Self {
        Self {
            estimated_steps: 1,
            affected_item_count: 1,
            parallelizable: false,
            domain_specific: false,
            uncertainty: 0.0,
        }
    }
}

/// A caller-submitted unit of work.
///
/// # Invariants
/// - `shape.uncertainty` is within `[0.0, 1.0]`
/// - `shape.estimated_steps >= 1`
/// - `description` is non-empty
///
/// All fields are immutable after construction; invariants are checked
/// in `Task::new` before any resource is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task
    id: TaskId,

    /// Opaque description of what to accomplish; never inspected by the core
    description: String,

    /// Declared complexity signals
    #[serde(flatten)]
    shape: TaskShape,
}

impl Task {
    /// Create a new task with the given description and declared shape.
    ///
    /// # Errors
    /// Returns `Err` if the description is empty, `uncertainty` falls
    /// outside `[0, 1]`, or `estimated_steps` is zero.
    pub fn new(description: impl Into<String>, shape: TaskShape) -> Result<Self, TaskError> {
        let description = description.into();
        if description.is_empty() {
            return Err(TaskError::EmptyDescription);
        }
        if !(0.0..=1.0).contains(&shape.uncertainty) {
            return Err(TaskError::UncertaintyOutOfRange {
                value: shape.uncertainty,
            });
        }
        if shape.estimated_steps == 0 {
            return Err(TaskError::ZeroSteps);
        }

        Ok(Self {
            id: TaskId::new(),
            description,
            shape,
        })
    }

    // Getters - the task is immutable after construction

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn shape(&self) -> &TaskShape {
        &self.shape
    }

    pub fn estimated_steps(&self) -> u32 {
        self.shape.estimated_steps
    }

    pub fn affected_item_count(&self) -> u32 {
        self.shape.affected_item_count
    }

    pub fn parallelizable(&self) -> bool {
        self.shape.parallelizable
    }

    pub fn domain_specific(&self) -> bool {
        self.shape.domain_specific
    }

    pub fn uncertainty(&self) -> f64 {
        self.shape.uncertainty
    }
}

/// Errors raised at task submission, before any resources are committed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("Task description cannot be empty")]
    EmptyDescription,

    #[error("Uncertainty {value} is outside the valid range [0, 1]")]
    UncertaintyOutOfRange { value: f64 },

    #[error("Estimated steps must be at least 1")]
    ZeroSteps,
}

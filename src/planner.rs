//! Execution planning: decompose a delegated task into stages of
//! worker specs.
//!
//! # Plan shapes
//! - Parallelizable tasks partition their affected items into one stage
//!   of independent workers.
//! - Sequential tasks build one stage per dependent phase, each stage a
//!   single spec consuming the prior stage's output.
//! - Mixed shape composes the two: a fan-out stage followed by one
//!   integration spec depending on all of its workers.

use serde::{Deserialize, Serialize};

use crate::budget::{split_proportional, SharedBudgetTracker};
use crate::config::OrchestratorConfig;
use crate::task::{Task, TaskId};
use crate::worker::{ContextScope, WorkerSpec};

/// Cost model constants: a conservative per-step and per-item estimate
/// of how many resource units a task will consume.
const COST_PER_STEP: u64 = 500;
const COST_PER_ITEM: u64 = 10;
const MIN_TASK_COST: u64 = 200;

/// Canonical phases for sequential decomposition, each with its
/// estimated share of the work; implementation dominates.
const PHASES: [(&str, f64); 4] = [
    ("analyze", 1.0),
    ("plan", 1.0),
    ("implement", 2.0),
    ("validate", 1.0),
];

/// A set of worker specs that run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub specs: Vec<WorkerSpec>,
}

impl Stage {
    fn new(specs: Vec<WorkerSpec>) -> Self {
        Self { specs }
    }

    /// Total budget reserved for this stage.
    pub fn allotment(&self) -> u64 {
        self.specs.iter().map(|s| s.budget_allotment).sum()
    }
}

/// An ordered list of stages; stage N+1 only starts after all of
/// stage N reaches a terminal state.
///
/// # Invariants
/// - at least one stage, each with at least one spec
/// - total allotment did not exceed the session's remaining budget at
///   build time (re-validated at each stage admission)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: TaskId,
    pub stages: Vec<Stage>,
}

impl Plan {
    fn new(task_id: TaskId, stages: Vec<Stage>) -> Result<Self, PlanError> {
        if stages.is_empty() || stages.iter().any(|s| s.specs.is_empty()) {
            return Err(PlanError::EmptyPlan);
        }
        Ok(Self { task_id, stages })
    }

    /// Total budget reserved across all stages.
    pub fn total_allotment(&self) -> u64 {
        self.stages.iter().map(Stage::allotment).sum()
    }

    pub fn worker_count(&self) -> usize {
        self.stages.iter().map(|s| s.specs.len()).sum()
    }
}

/// Errors surfaced while building a plan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("Plan needs {needed} units but only {available} remain")]
    InsufficientBudget { needed: u64, available: u64 },

    #[error("Delegation depth {depth} exceeds the configured ceiling of {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("Plan must contain at least one stage with at least one worker")]
    EmptyPlan,
}

/// Conservative estimate of a task's total resource cost.
pub(crate) fn estimate_task_cost(task: &Task) -> u64 {
    let cost = u64::from(task.estimated_steps()) * COST_PER_STEP
        + u64::from(task.affected_item_count()) * COST_PER_ITEM;
    cost.max(MIN_TASK_COST)
}

/// Number of parallel workers for an item partition.
///
/// `min(affected_items / min_items_per_worker, max_concurrent_workers)`,
/// degrading to a single worker when the item count is below the
/// per-worker minimum. Delegation with one worker, never zero.
fn partition_width(task: &Task, config: &OrchestratorConfig) -> u32 {
    let by_items = task.affected_item_count() / config.min_items_per_worker.max(1);
    by_items.min(config.max_concurrent_workers).max(1)
}

/// Build an execution plan for a delegated task.
///
/// The plan is funded from the session's currently-available budget; if
/// the conservative cost estimate cannot be covered, this returns an
/// error rather than an under-funded plan.
///
/// # Errors
/// - `PlanError::DepthExceeded` when `depth` is at the recursion ceiling
/// - `PlanError::InsufficientBudget` when the tracker cannot fund it
pub fn build_plan(
    task: &Task,
    tracker: &SharedBudgetTracker,
    config: &OrchestratorConfig,
    depth: u32,
) -> Result<Plan, PlanError> {
    if depth >= config.max_nesting_depth {
        return Err(PlanError::DepthExceeded {
            depth,
            max: config.max_nesting_depth,
        });
    }

    let estimate = estimate_task_cost(task);
    let available = tracker.remaining();
    if estimate > available {
        return Err(PlanError::InsufficientBudget {
            needed: estimate,
            available,
        });
    }

    let plan = if task.parallelizable() {
        build_parallel_plan(task, estimate, config, depth)?
    } else {
        build_sequential_plan(task, estimate, depth)?
    };

    tracing::info!(
        task = %task.id(),
        stages = plan.stages.len(),
        workers = plan.worker_count(),
        allotment = plan.total_allotment(),
        "plan built"
    );

    Ok(plan)
}

/// One stage of `k` independent partition workers; when the task is also
/// long or uncertain, a second integration stage merges their outputs.
fn build_parallel_plan(
    task: &Task,
    estimate: u64,
    config: &OrchestratorConfig,
    depth: u32,
) -> Result<Plan, PlanError> {
    let k = partition_width(task, config);
    let needs_integration = task.estimated_steps() >= crate::policy::STEP_THRESHOLD
        || task.uncertainty() > crate::policy::UNCERTAINTY_THRESHOLD;

    // Reserve a share of the estimate for the integration worker before
    // splitting the rest across the partitions.
    let (fanout_budget, integration_budget) = if needs_integration {
        let integration = estimate / 4;
        (estimate - integration, integration)
    } else {
        (estimate, 0)
    };

    let mut partitions: Vec<WorkerSpec> = (1..=k)
        .map(|i| {
            WorkerSpec::new(format!("[partition {}/{}] {}", i, k, task.description()), 0)
                .with_scope(ContextScope::Scoped)
                .with_step_share(1.0 / f64::from(k))
                .with_nesting_depth(depth + 1)
        })
        .collect();

    let weights: Vec<f64> = partitions.iter().map(|s| s.step_share).collect();
    for (spec, allotment) in partitions
        .iter_mut()
        .zip(split_proportional(&weights, fanout_budget))
    {
        spec.budget_allotment = allotment;
    }

    let mut stages = Vec::new();
    if needs_integration {
        let partition_ids = partitions.iter().map(|s| s.id).collect();
        let integration = WorkerSpec::new(
            format!("[integrate] {}", task.description()),
            integration_budget,
        )
        .with_dependencies(partition_ids)
        .with_nesting_depth(depth + 1);

        stages.push(Stage::new(partitions));
        stages.push(Stage::new(vec![integration]));
    } else {
        stages.push(Stage::new(partitions));
    }

    Plan::new(task.id(), stages)
}

/// A chain of dependent phases, one single-spec stage per phase, each
/// consuming the prior phase's aggregated output. Allotments follow the
/// phases' step shares.
fn build_sequential_plan(task: &Task, estimate: u64, depth: u32) -> Result<Plan, PlanError> {
    let phase_count = (task.estimated_steps() as usize).clamp(1, PHASES.len());

    let mut specs: Vec<WorkerSpec> = Vec::with_capacity(phase_count);
    let mut previous_id = None;
    for (phase, share) in PHASES.iter().take(phase_count) {
        let mut spec = WorkerSpec::new(format!("[{}] {}", phase, task.description()), 0)
            .with_step_share(*share)
            .with_nesting_depth(depth + 1);

        if let Some(prev) = previous_id {
            spec = spec.with_dependencies(vec![prev]);
        }
        previous_id = Some(spec.id);
        specs.push(spec);
    }

    let weights: Vec<f64> = specs.iter().map(|s| s.step_share).collect();
    let stages = specs
        .into_iter()
        .zip(split_proportional(&weights, estimate))
        .map(|(mut spec, allotment)| {
            spec.budget_allotment = allotment;
            Stage::new(vec![spec])
        })
        .collect();

    Plan::new(task.id(), stages)
}

//! Delegation policy: decide whether a task runs inline or is delegated
//! to autonomous clone workers.
//!
//! Delegation carries fixed overhead (spinning up an isolated worker and
//! granting it a full context copy), so it only pays off for work that is
//! long, wide, parallelizable, or uncertain enough to benefit from
//! autonomous exploration.

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Complexity thresholds the policy evaluates against.
pub const STEP_THRESHOLD: u32 = 5;
pub const ITEM_FANOUT_THRESHOLD: u32 = 100;
pub const UNCERTAINTY_THRESHOLD: f64 = 0.5;

/// How the task should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionMode {
    /// Run directly on the orchestrator, bypassing the concurrency machinery
    ExecuteInline,
    /// Spawn one or more clone workers
    Delegate,
}

/// Which rule produced the decision.
///
/// Exactly one reason is reported: the first condition that fired, in
/// the order listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationReason {
    /// Task needs a specialist capability; the caller must route it
    RequiresSpecialistCapability,
    /// Estimated step count met the delegation threshold
    StepCountAtThreshold,
    /// Affected item count met the fanout threshold
    WideItemFanout,
    /// Task declared itself parallelizable
    Parallelizable,
    /// Declared uncertainty exceeds the exploration threshold
    HighUncertainty,
    /// No trigger fired; inline execution is cheaper
    BelowComplexityThreshold,
}

/// Output of the delegation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationDecision {
    pub mode: DecisionMode,
    pub reason: DelegationReason,
}

/// Decide whether a task should be delegated.
///
/// Deterministic, evaluated strictly in order:
/// 1. Domain-specific tasks are never delegated; they go back to the
///    caller for specialist routing.
/// 2. Any of: steps >= 5, items >= 100, parallelizable, uncertainty > 0.5
///    triggers delegation, reported as the first condition that fired.
/// 3. Otherwise execute inline.
///
/// # Pure Function
/// No side effects; identical tasks always yield identical decisions.
pub fn decide(task: &Task) -> DelegationDecision {
    if task.domain_specific() {
        return DelegationDecision {
            mode: DecisionMode::ExecuteInline,
            reason: DelegationReason::RequiresSpecialistCapability,
        };
    }

    let trigger = if task.estimated_steps() >= STEP_THRESHOLD {
        Some(DelegationReason::StepCountAtThreshold)
    } else if task.affected_item_count() >= ITEM_FANOUT_THRESHOLD {
        Some(DelegationReason::WideItemFanout)
    } else if task.parallelizable() {
        Some(DelegationReason::Parallelizable)
    } else if task.uncertainty() > UNCERTAINTY_THRESHOLD {
        Some(DelegationReason::HighUncertainty)
    } else {
        None
    };

    match trigger {
        Some(reason) => DelegationDecision {
            mode: DecisionMode::Delegate,
            reason,
        },
        None => DelegationDecision {
            mode: DecisionMode::ExecuteInline,
            reason: DelegationReason::BelowComplexityThreshold,
        },
    }
}

//! Per-worker execution context.
//!
//! Each worker receives its own context snapshot at spawn time; sibling
//! workers share nothing mutable, which keeps them isolated by
//! construction.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::spec::{ContextScope, WorkerId, WorkerSpec};

/// Read-only context handed to the execution backend for one worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Context snapshot per the spec's `ContextScope`; `None` for scoped
    /// workers that only see their instruction and dependency outputs
    pub snapshot: Option<serde_json::Value>,

    /// Aggregated outputs of the prior-stage workers this spec depends on
    pub dependency_outputs: HashMap<WorkerId, serde_json::Value>,

    /// Resource units this worker may consume before being force-stopped
    pub budget_allotment: u64,

    /// Cooperative cancellation signal the backend must observe
    pub cancel: CancellationToken,
}

impl WorkerContext {
    /// Assemble the context for a worker from the session snapshot and
    /// the outputs of completed prior-stage workers.
    ///
    /// # Errors
    /// Returns `Err` with the missing worker IDs if any declared
    /// dependency has no materialized output. The caller maps this to an
    /// initialization failure.
    pub fn assemble(
        spec: &WorkerSpec,
        session_snapshot: &serde_json::Value,
        prior_outputs: &HashMap<WorkerId, serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<Self, Vec<WorkerId>> {
        let mut dependency_outputs = HashMap::new();
        let mut missing = Vec::new();

        for dep in &spec.depends_on {
            match prior_outputs.get(dep) {
                Some(output) => {
                    dependency_outputs.insert(*dep, output.clone());
                }
                None => missing.push(*dep),
            }
        }

        if !missing.is_empty() {
            return Err(missing);
        }

        let snapshot = match spec.context_scope {
            ContextScope::Full => Some(session_snapshot.clone()),
            ContextScope::Scoped => None,
        };

        Ok(Self {
            snapshot,
            dependency_outputs,
            budget_allotment: spec.budget_allotment,
            cancel,
        })
    }

    /// Check if cooperative cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

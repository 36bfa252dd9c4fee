//! Top-level orchestration controller.
//!
//! # Task Processing Flow
//! ```text
//! 1. Consult the delegation policy
//! 2. Inline: run directly, bypassing the concurrency machinery
//!    (domain-specific tasks are handed to the specialist router instead)
//! 3. Delegate:
//!    a. Build a plan (stages of worker specs)
//!    b. Per stage: check budget, reserve, spawn workers concurrently
//!    c. Finalize every worker exactly once (commit or release)
//!    d. Aggregate successful outputs for the next stage
//!    e. Persist the session after each stage
//! 4. Return a structured OrchestrationResult
//! ```

mod result;

pub use result::{FailureEntry, OrchestrationResult, OrchestrationStatus, StageResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::backend::{ExecutionBackend, Lesson, LessonLog, SpecialistRouter};
use crate::budget::{BudgetTracker, SharedBudgetTracker};
use crate::config::{LowBudgetPolicy, OrchestratorConfig};
use crate::planner::{self, Plan, PlanError};
use crate::policy::{self, DecisionMode, DelegationReason};
use crate::session::{SessionError, SessionId, SessionPhase, SessionState, SessionStore};
use crate::task::Task;
use crate::worker::{
    WorkerContext, WorkerError, WorkerFailureKind, WorkerHandle, WorkerId, WorkerRecord,
    WorkerSpec, WorkerState,
};

/// How long a cancelled or timed-out backend operation gets to unwind
/// cooperatively and report its partial cost.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Caller-supplied reduction of a stage's successful worker outputs.
pub type Aggregator = dyn Fn(&[serde_json::Value]) -> serde_json::Value + Send + Sync;

fn default_aggregator(outputs: &[serde_json::Value]) -> serde_json::Value {
    serde_json::Value::Array(outputs.to_vec())
}

fn log_transition(result: Result<(), WorkerError>) {
    // Transitions driven here follow the state machine by construction;
    // a violation is a bug worth a loud log, not a run failure.
    if let Err(err) = result {
        tracing::error!("worker lifecycle contract violated: {}", err);
    }
}

/// The top-level controller for one orchestration session at a time.
///
/// Owns the plan and all worker handles exclusively; the budget tracker
/// is shared with workers only through its own atomic API.
pub struct Orchestrator {
    config: OrchestratorConfig,
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn SessionStore>,
    router: Option<Arc<dyn SpecialistRouter>>,
    lessons: Option<Arc<dyn LessonLog>>,
    aggregate: Box<Aggregator>,
    context_snapshot: serde_json::Value,
    depth: u32,
    cancel: CancellationToken,
}

/// Accumulated state of one run, mirrored into the session store.
struct RunState {
    session_id: SessionId,
    task: Task,
    plan: Plan,
    completed_stages: Vec<StageResult>,
    worker_records: Vec<WorkerRecord>,
    failures: Vec<FailureEntry>,
    outputs: HashMap<WorkerId, serde_json::Value>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            backend,
            store,
            router: None,
            lessons: None,
            aggregate: Box::new(default_aggregator),
            context_snapshot: serde_json::Value::Null,
            depth: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Install the specialist router consulted for domain-specific tasks.
    pub fn with_router(mut self, router: Arc<dyn SpecialistRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Install the append-only lesson log written after each run.
    pub fn with_lesson_log(mut self, lessons: Arc<dyn LessonLog>) -> Self {
        self.lessons = Some(lessons);
        self
    }

    /// Replace the default aggregation (a JSON array of outputs) with a
    /// task-domain reduction.
    pub fn with_aggregator(
        mut self,
        aggregate: impl Fn(&[serde_json::Value]) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.aggregate = Box::new(aggregate);
        self
    }

    /// Set the working-context snapshot copied to full-scope workers.
    pub fn with_context_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.context_snapshot = snapshot;
        self
    }

    /// Set the delegation depth this orchestrator plans at.
    ///
    /// The root session plans at depth 0. A backend that delegates
    /// recursively builds its nested orchestrator with the
    /// `nesting_depth` of the spec it is serving, so the configured
    /// ceiling bounds the whole delegation tree.
    pub fn with_nesting_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Token the caller can use to cancel the whole session; cancellation
    /// propagates to every running worker and still runs their cleanup
    /// finalizers before `run` returns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a task to completion and return the structured result.
    ///
    /// Expected failure modes (budget exhaustion, timeouts, dependency
    /// failures) are reported in the result, never as an error.
    pub async fn run(&self, task: Task) -> OrchestrationResult {
        let session_id = SessionId::new();
        let decision = policy::decide(&task);
        tracing::info!(
            task = %task.id(),
            mode = ?decision.mode,
            reason = ?decision.reason,
            "delegation decision"
        );

        let result = match decision.mode {
            DecisionMode::ExecuteInline => {
                if decision.reason == DelegationReason::RequiresSpecialistCapability {
                    self.route_to_specialist(session_id, &task).await
                } else {
                    self.run_inline(session_id, &task).await
                }
            }
            DecisionMode::Delegate => self.run_delegated(session_id, task.clone()).await,
        };

        self.record_lesson(&task, &result).await;
        result
    }

    /// Resume an interrupted session from its last completed stage.
    ///
    /// # Errors
    /// Returns `Err` only when the session cannot be loaded; a resumed
    /// run reports its outcome through the result like `run` does.
    pub async fn resume(&self, session_id: SessionId) -> Result<OrchestrationResult, SessionError> {
        let state = self.store.load(session_id).await?;

        if let SessionPhase::Finished(status) = state.phase {
            // Nothing outstanding; reconstruct the terminal result.
            return Ok(OrchestrationResult {
                session_id,
                status,
                stage_results: state.completed_stages,
                total_budget_consumed: state.consumed_budget,
                failures: state.failures,
                routed_to: None,
            });
        }

        tracing::info!(
            session = %session_id,
            completed_stages = state.completed_stages.len(),
            "resuming interrupted session"
        );

        let tracker = BudgetTracker::resumed(self.config.total_budget, state.consumed_budget);

        // Outputs are only recorded for workers that succeeded.
        let mut outputs = HashMap::new();
        for record in &state.worker_records {
            if let Some(output) = &record.output {
                outputs.insert(record.id, output.clone());
            }
        }

        let task = state.task.clone();
        let run = RunState {
            session_id,
            task: state.task,
            plan: state.plan,
            completed_stages: state.completed_stages,
            worker_records: state.worker_records,
            failures: state.failures,
            outputs,
        };

        let result = self.execute_plan(run, tracker).await;
        self.record_lesson(&task, &result).await;
        Ok(result)
    }

    async fn run_delegated(&self, session_id: SessionId, task: Task) -> OrchestrationResult {
        let tracker = BudgetTracker::shared(self.config.total_budget);

        let plan = match planner::build_plan(&task, &tracker, &self.config, self.depth) {
            Ok(plan) => plan,
            Err(err) => {
                // The policy ruled that delegation is warranted; an
                // unfundable plan is surfaced, never downgraded to
                // inline execution.
                let kind = match err {
                    PlanError::DepthExceeded { .. } => WorkerFailureKind::DependencyUnmet,
                    _ => WorkerFailureKind::BudgetExceeded,
                };
                tracing::warn!(task = %task.id(), "plan construction failed: {}", err);
                return OrchestrationResult {
                    session_id,
                    status: OrchestrationStatus::Failed,
                    stage_results: Vec::new(),
                    total_budget_consumed: 0,
                    failures: vec![FailureEntry::plan_time(kind, err.to_string())],
                    routed_to: None,
                };
            }
        };

        let run = RunState {
            session_id,
            task,
            plan,
            completed_stages: Vec::new(),
            worker_records: Vec::new(),
            failures: Vec::new(),
            outputs: HashMap::new(),
        };

        self.execute_plan(run, tracker).await
    }

    /// Drive the plan stage by stage; stage N+1 is only admitted after
    /// every stage-N worker reached a terminal state and was finalized.
    async fn execute_plan(
        &self,
        mut run: RunState,
        tracker: SharedBudgetTracker,
    ) -> OrchestrationResult {
        let total_stages = run.plan.stages.len();
        let start = run.completed_stages.len();
        let mut aborted = false;

        for stage_index in start..total_stages {
            if self.cancel.is_cancelled() {
                run.failures.push(FailureEntry::plan_time(
                    WorkerFailureKind::Cancelled,
                    "session cancelled before stage admission",
                ));
                aborted = true;
                break;
            }

            let stage = run.plan.stages[stage_index].clone();

            // A spec whose dependency never materialized aborts the
            // remainder of the plan; downstream stages cannot run.
            let mut unmet = false;
            for spec in &stage.specs {
                let missing: Vec<String> = spec
                    .depends_on
                    .iter()
                    .filter(|dep| !run.outputs.contains_key(dep))
                    .map(ToString::to_string)
                    .collect();
                if !missing.is_empty() {
                    run.failures.push(FailureEntry::for_worker(
                        spec.id,
                        WorkerFailureKind::DependencyUnmet,
                        format!("prior-stage outputs never materialized: {}", missing.join(", ")),
                    ));
                    unmet = true;
                }
            }
            if unmet {
                aborted = true;
                break;
            }

            // Low-budget signal, consulted before every stage admission.
            let mut specs = stage.specs.clone();
            if tracker.low_budget() {
                match self.config.low_budget_policy {
                    LowBudgetPolicy::Proceed => {
                        tracing::warn!(
                            stage = stage_index,
                            remaining = tracker.remaining(),
                            "admitting stage despite low budget"
                        );
                    }
                    LowBudgetPolicy::ShrinkStage => {
                        let keep = (specs.len() + 1) / 2;
                        if keep < specs.len() {
                            tracing::warn!(
                                stage = stage_index,
                                from = specs.len(),
                                to = keep,
                                "low budget: shrinking stage width"
                            );
                            let dropped: Vec<WorkerId> =
                                specs[keep..].iter().map(|s| s.id).collect();
                            specs.truncate(keep);
                            // Downstream specs must not wait on workers
                            // that will never run.
                            for downstream in &mut run.plan.stages[stage_index + 1..] {
                                for spec in &mut downstream.specs {
                                    spec.depends_on.retain(|dep| !dropped.contains(dep));
                                }
                            }
                        }
                    }
                    LowBudgetPolicy::Refuse => {
                        run.failures.push(FailureEntry::plan_time(
                            WorkerFailureKind::BudgetExceeded,
                            "low-budget threshold reached; refusing further delegation",
                        ));
                        aborted = true;
                        break;
                    }
                }
            }

            // Reserve budget for the whole stage before spawning anything.
            let mut reserved: Vec<WorkerId> = Vec::new();
            let mut unfunded: Option<WorkerId> = None;
            for spec in &specs {
                if tracker.reserve(spec.id, spec.budget_allotment) {
                    reserved.push(spec.id);
                } else {
                    unfunded = Some(spec.id);
                    break;
                }
            }
            if let Some(worker) = unfunded {
                for id in reserved {
                    tracker.release(id);
                }
                run.failures.push(FailureEntry::for_worker(
                    worker,
                    WorkerFailureKind::BudgetExceeded,
                    "stage reservation could not be funded",
                ));
                aborted = true;
                break;
            }

            tracing::info!(
                session = %run.session_id,
                stage = stage_index,
                workers = specs.len(),
                "stage admitted"
            );

            // Drive all workers of the stage concurrently. Each gets its
            // own context snapshot and child cancellation token; siblings
            // share nothing mutable except the tracker.
            let prior = Arc::new(run.outputs.clone());
            let timeout = Duration::from_secs(self.config.worker_timeout_secs);
            let mut worker_ids = Vec::with_capacity(specs.len());
            let mut joins = Vec::with_capacity(specs.len());
            for spec in specs {
                worker_ids.push(spec.id);
                joins.push(tokio::spawn(drive_worker(
                    Arc::clone(&self.backend),
                    spec,
                    self.context_snapshot.clone(),
                    Arc::clone(&prior),
                    self.cancel.child_token(),
                    timeout,
                )));
            }

            let mut stage_outputs: Vec<serde_json::Value> = Vec::new();
            let mut any_success = false;

            for (worker_id, joined) in worker_ids.into_iter().zip(join_all(joins).await) {
                let mut handle = match joined {
                    Ok(handle) => handle,
                    Err(join_err) => {
                        tracing::error!(worker = %worker_id, "worker task panicked: {}", join_err);
                        tracker.release(worker_id);
                        run.failures.push(FailureEntry::for_worker(
                            worker_id,
                            WorkerFailureKind::ExecutionError,
                            format!("worker task panicked: {}", join_err),
                        ));
                        continue;
                    }
                };

                // Guaranteed finalizer: settle the reservation exactly
                // once. Commit clamps to the reservation, and a cost of
                // zero returns it to the pool in full.
                tracker.commit(handle.id(), handle.consumed_budget());

                match handle.state() {
                    WorkerState::Succeeded => {
                        any_success = true;
                        if let Some(output) = handle.output() {
                            run.outputs.insert(handle.id(), output.clone());
                            stage_outputs.push(output.clone());
                        }
                    }
                    _ => {
                        if let Some(failure) = handle.error() {
                            tracing::warn!(
                                worker = %handle.id(),
                                kind = %failure.kind,
                                "worker failed: {}",
                                failure.detail
                            );
                            run.failures.push(failure.clone().into());
                        }
                    }
                }

                log_transition(handle.mark_cleaned());
                run.worker_records.push(handle.record());
            }

            if !any_success {
                // Nothing downstream can consume this stage's output;
                // record the next stage's now-unmet dependencies before
                // aborting so the result names the workers that never ran.
                if let Some(next) = run.plan.stages.get(stage_index + 1) {
                    for spec in &next.specs {
                        let missing: Vec<String> = spec
                            .depends_on
                            .iter()
                            .filter(|dep| !run.outputs.contains_key(dep))
                            .map(ToString::to_string)
                            .collect();
                        if !missing.is_empty() {
                            run.failures.push(FailureEntry::for_worker(
                                spec.id,
                                WorkerFailureKind::DependencyUnmet,
                                format!(
                                    "prior-stage outputs never materialized: {}",
                                    missing.join(", ")
                                ),
                            ));
                        }
                    }
                }
                aborted = true;
                self.persist(&run, SessionPhase::InProgress, tracker.consumed())
                    .await;
                break;
            }

            let aggregated = (self.aggregate)(&stage_outputs);
            run.completed_stages.push(StageResult {
                stage: stage_index,
                aggregated,
            });

            self.persist(&run, SessionPhase::InProgress, tracker.consumed())
                .await;
        }

        // A broken dependency chain still reports PartialSuccess: the
        // failing stage's workers ran and their detail is carried, even
        // when no stage fully completed.
        let dependency_abort = run
            .failures
            .iter()
            .any(|f| f.kind == WorkerFailureKind::DependencyUnmet);

        let status = if run.failures.is_empty() && run.completed_stages.len() == total_stages {
            OrchestrationStatus::Success
        } else if !run.completed_stages.is_empty() || dependency_abort {
            OrchestrationStatus::PartialSuccess
        } else {
            OrchestrationStatus::Failed
        };

        if aborted {
            tracing::warn!(session = %run.session_id, %status, "plan aborted early");
        }

        self.persist(&run, SessionPhase::Finished(status), tracker.consumed())
            .await;

        OrchestrationResult {
            session_id: run.session_id,
            status,
            stage_results: run.completed_stages,
            total_budget_consumed: tracker.consumed(),
            failures: run.failures,
            routed_to: None,
        }
    }

    /// Run the task directly, bypassing the concurrency machinery, while
    /// still accounting its cost against the session budget.
    async fn run_inline(&self, session_id: SessionId, task: &Task) -> OrchestrationResult {
        let tracker = BudgetTracker::shared(self.config.total_budget);
        let allotment = planner::estimate_task_cost(task).min(tracker.remaining());
        let spec = WorkerSpec::new(task.description(), allotment);
        let worker_id = spec.id;

        if !tracker.reserve(worker_id, allotment) {
            return OrchestrationResult {
                session_id,
                status: OrchestrationStatus::Failed,
                stage_results: Vec::new(),
                total_budget_consumed: 0,
                failures: vec![FailureEntry::for_worker(
                    worker_id,
                    WorkerFailureKind::BudgetExceeded,
                    "could not fund inline execution",
                )],
                routed_to: None,
            };
        }

        let mut handle = drive_worker(
            Arc::clone(&self.backend),
            spec,
            self.context_snapshot.clone(),
            Arc::new(HashMap::new()),
            self.cancel.child_token(),
            Duration::from_secs(self.config.worker_timeout_secs),
        )
        .await;

        tracker.commit(handle.id(), handle.consumed_budget());

        let (status, stage_results, failures) = match handle.state() {
            WorkerState::Succeeded => {
                let aggregated = handle
                    .output()
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                (
                    OrchestrationStatus::Success,
                    vec![StageResult {
                        stage: 0,
                        aggregated,
                    }],
                    Vec::new(),
                )
            }
            _ => {
                let failures = handle
                    .error()
                    .cloned()
                    .map(FailureEntry::from)
                    .into_iter()
                    .collect();
                (OrchestrationStatus::Failed, Vec::new(), failures)
            }
        };

        log_transition(handle.mark_cleaned());

        OrchestrationResult {
            session_id,
            status,
            stage_results,
            total_budget_consumed: tracker.consumed(),
            failures,
            routed_to: None,
        }
    }

    /// Hand a domain-specific task to the external specialist router;
    /// the core never executes such tasks itself.
    async fn route_to_specialist(&self, session_id: SessionId, task: &Task) -> OrchestrationResult {
        let routed = match &self.router {
            Some(router) => router.route(task).await,
            None => Err(anyhow::anyhow!(
                "task requires a specialist capability but no router is configured"
            )),
        };

        match routed {
            Ok(specialist) => {
                tracing::info!(task = %task.id(), specialist, "routed to specialist");
                OrchestrationResult {
                    session_id,
                    status: OrchestrationStatus::Success,
                    stage_results: Vec::new(),
                    total_budget_consumed: 0,
                    failures: Vec::new(),
                    routed_to: Some(specialist),
                }
            }
            Err(err) => {
                tracing::warn!(task = %task.id(), "specialist routing failed: {:#}", err);
                OrchestrationResult {
                    session_id,
                    status: OrchestrationStatus::Failed,
                    stage_results: Vec::new(),
                    total_budget_consumed: 0,
                    failures: vec![FailureEntry::plan_time(
                        WorkerFailureKind::ExecutionError,
                        format!("specialist routing failed: {:#}", err),
                    )],
                    routed_to: None,
                }
            }
        }
    }

    async fn persist(&self, run: &RunState, phase: SessionPhase, consumed: u64) {
        let state = SessionState {
            session_id: run.session_id,
            task: run.task.clone(),
            plan: run.plan.clone(),
            phase,
            completed_stages: run.completed_stages.clone(),
            worker_records: run.worker_records.clone(),
            failures: run.failures.clone(),
            consumed_budget: consumed,
            updated_at: Utc::now(),
        };

        if let Err(err) = self.store.save(&state).await {
            tracing::warn!(session = %run.session_id, "failed to persist session state: {}", err);
        }
    }

    async fn record_lesson(&self, task: &Task, result: &OrchestrationResult) {
        let Some(lessons) = &self.lessons else {
            return;
        };

        let category = if task.domain_specific() {
            "specialist"
        } else if task.parallelizable() {
            "parallel"
        } else {
            "sequential"
        };

        let lesson = Lesson::new(
            category,
            format!(
                "status={} consumed={} failures={}",
                result.status,
                result.total_budget_consumed,
                result.failures.len()
            ),
        );

        if let Err(err) = lessons.append(lesson).await {
            tracing::warn!("failed to record lesson: {}", err);
        }
    }
}

/// How one worker's execution ended, before lifecycle bookkeeping.
enum ExecEnd {
    Completed(crate::backend::ExecutionOutcome),
    TimedOut,
    Cancelled,
}

/// Drive a single worker through its full lifecycle and return the
/// terminal handle. Runs on its own tokio task for staged execution and
/// directly for inline execution.
async fn drive_worker(
    backend: Arc<dyn ExecutionBackend>,
    spec: WorkerSpec,
    snapshot: serde_json::Value,
    prior: Arc<HashMap<WorkerId, serde_json::Value>>,
    cancel: CancellationToken,
    timeout: Duration,
) -> WorkerHandle {
    let mut handle = WorkerHandle::new(spec.clone());
    log_transition(handle.admit());

    let ctx = match WorkerContext::assemble(&spec, &snapshot, &prior, cancel.clone()) {
        Ok(ctx) => ctx,
        Err(missing) => {
            let missing: Vec<String> = missing.iter().map(ToString::to_string).collect();
            log_transition(handle.fail(
                WorkerFailureKind::InitializationError,
                format!("context assembly failed, missing outputs: {}", missing.join(", ")),
                0,
            ));
            return handle;
        }
    };

    log_transition(handle.start());
    tracing::debug!(worker = %handle.id(), allotment = spec.budget_allotment, "worker running");

    let exec = backend.execute(&spec, &ctx);
    tokio::pin!(exec);

    let end = tokio::select! {
        outcome = &mut exec => ExecEnd::Completed(outcome),
        _ = tokio::time::sleep(timeout) => ExecEnd::TimedOut,
        _ = cancel.cancelled() => ExecEnd::Cancelled,
    };

    match end {
        ExecEnd::Completed(outcome) => {
            if outcome.cost > spec.budget_allotment {
                // Force-stop semantics: the overage is never booked.
                log_transition(handle.fail(
                    WorkerFailureKind::BudgetExceeded,
                    format!(
                        "reported cost {} exceeds allotment {}",
                        outcome.cost, spec.budget_allotment
                    ),
                    spec.budget_allotment,
                ));
            } else {
                match outcome.result {
                    Ok(output) => log_transition(handle.succeed(output, outcome.cost)),
                    Err(err) => log_transition(handle.fail(
                        WorkerFailureKind::ExecutionError,
                        format!("{:#}", err),
                        outcome.cost,
                    )),
                }
            }
        }
        interrupted => {
            // Signal cooperative cancellation and give the backend a
            // grace period to unwind and report its partial cost.
            cancel.cancel();
            let cost = match tokio::time::timeout(CANCEL_GRACE, &mut exec).await {
                Ok(outcome) => outcome.cost.min(spec.budget_allotment),
                Err(_) => {
                    tracing::warn!(
                        worker = %handle.id(),
                        "backend did not unwind within the grace period"
                    );
                    0
                }
            };

            match interrupted {
                ExecEnd::TimedOut => log_transition(handle.time_out(cost)),
                _ => log_transition(handle.fail(
                    WorkerFailureKind::Cancelled,
                    "session cancelled while in flight",
                    cost,
                )),
            }
        }
    }

    handle
}

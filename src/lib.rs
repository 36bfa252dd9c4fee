//! # Overseer
//!
//! Task orchestration core for the master-clone delegation pattern.
//!
//! Given a unit of work, the orchestrator decides whether to execute it
//! directly or to spawn autonomous clone workers that carry a copy of the
//! working context, run independently (in parallel or as a dependency
//! chain), consume a bounded resource budget, and report results back
//! for aggregation.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────┐
//!            │   Orchestrator   │
//!            └────────┬─────────┘
//!        policy ──────┤────── planner
//!                     ▼
//!          ┌─────────────────────┐
//!          │ Stage 1: w1  w2  w3 │  (concurrent clones)
//!          │ Stage 2:     w4     │  (consumes stage 1 output)
//!          └──────────┬──────────┘
//!                     ▼
//!        BudgetTracker · SessionStore
//!  ```
//!
//! ## Task Flow
//! 1. Submit a [`task::Task`] with its declared complexity signals
//! 2. [`policy::decide`] picks inline execution or delegation
//! 3. [`planner::build_plan`] shapes stages of [`worker::WorkerSpec`]s
//! 4. The [`orchestrator::Orchestrator`] drives stages, enforcing the
//!    budget and worker lifecycle, and persists progress per stage
//! 5. The caller receives a structured
//!    [`orchestrator::OrchestrationResult`]
//!
//! ## Modules
//! - `policy`: pure delegation decision
//! - `planner`: plan construction and budget funding
//! - `worker`: clone specs, lifecycle state machine, context
//! - `budget`: session budget with atomic reserve/commit/release
//! - `session`: resumable session persistence
//! - `backend`: injected execution/routing/lesson collaborators

pub mod backend;
pub mod budget;
pub mod config;
pub mod orchestrator;
pub mod planner;
pub mod policy;
pub mod session;
pub mod task;
pub mod worker;

pub use backend::{ExecutionBackend, ExecutionOutcome, LessonLog, SpecialistRouter};
pub use config::{LowBudgetPolicy, OrchestratorConfig};
pub use orchestrator::{OrchestrationResult, OrchestrationStatus, Orchestrator};
pub use session::{SessionId, SessionStore};
pub use task::{Task, TaskShape};

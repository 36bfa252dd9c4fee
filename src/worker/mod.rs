//! Clone workers: specs, lifecycle state machine, and execution context.

mod context;
mod handle;
mod spec;

pub use context::WorkerContext;
pub use handle::{
    WorkerError, WorkerFailure, WorkerFailureKind, WorkerHandle, WorkerRecord, WorkerState,
};
pub use spec::{ContextScope, WorkerId, WorkerSpec};

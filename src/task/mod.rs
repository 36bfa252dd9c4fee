//! Task definitions: the unit of requested work and its declared shape.

mod task;

pub use task::{Task, TaskError, TaskId, TaskShape};

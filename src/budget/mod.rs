//! Session budget tracking and allotment splitting.

mod allocation;
mod tracker;

pub use allocation::{split_equal, split_proportional};
pub use tracker::{BudgetError, BudgetTracker, SharedBudgetTracker};

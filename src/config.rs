//! Configuration for the orchestration core.
//!
//! Configuration can be set via environment variables:
//! - `OVERSEER_TOTAL_BUDGET` - Optional. Session budget in resource units. Defaults to `100000`.
//! - `OVERSEER_MIN_ITEMS_PER_WORKER` - Optional. Smallest item partition per parallel worker. Defaults to `20`.
//! - `OVERSEER_MAX_CONCURRENT_WORKERS` - Optional. Parallel worker ceiling per stage. Defaults to `4`.
//! - `OVERSEER_WORKER_TIMEOUT_SECS` - Optional. Wall-clock allowance per worker. Defaults to `300`.
//! - `OVERSEER_MAX_NESTING_DEPTH` - Optional. Recursive delegation ceiling. Defaults to `3`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// What the orchestrator does when the budget tracker reports the
/// low-budget threshold before admitting a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowBudgetPolicy {
    /// Admit the stage as planned.
    #[default]
    Proceed,
    /// Halve the stage's parallel width (never below one worker).
    ShrinkStage,
    /// Refuse to admit further delegation.
    Refuse,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Total session budget in abstract resource units
    pub total_budget: u64,

    /// Smallest slice of affected items worth a dedicated parallel worker
    pub min_items_per_worker: u32,

    /// Upper bound on workers running concurrently within a stage
    pub max_concurrent_workers: u32,

    /// Wall-clock allowance per worker, in seconds
    pub worker_timeout_secs: u64,

    /// Maximum recursive delegation depth
    pub max_nesting_depth: u32,

    /// Behavior when the low-budget threshold fires before a stage
    pub low_budget_policy: LowBudgetPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            total_budget: 100_000,
            min_items_per_worker: 20,
            max_concurrent_workers: 4,
            worker_timeout_secs: 300,
            max_nesting_depth: 3,
            low_budget_policy: LowBudgetPolicy::Proceed,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            total_budget: parse_env("OVERSEER_TOTAL_BUDGET", defaults.total_budget)?,
            min_items_per_worker: parse_env(
                "OVERSEER_MIN_ITEMS_PER_WORKER",
                defaults.min_items_per_worker,
            )?,
            max_concurrent_workers: parse_env(
                "OVERSEER_MAX_CONCURRENT_WORKERS",
                defaults.max_concurrent_workers,
            )?,
            worker_timeout_secs: parse_env(
                "OVERSEER_WORKER_TIMEOUT_SECS",
                defaults.worker_timeout_secs,
            )?,
            max_nesting_depth: parse_env("OVERSEER_MAX_NESTING_DEPTH", defaults.max_nesting_depth)?,
            low_budget_policy: defaults.low_budget_policy,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

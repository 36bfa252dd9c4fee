//! Budget tracking for an orchestration session.
//!
//! # Invariants
//! - `consumed + sum(reservations) <= total` (enforced at all times)
//!
//! The tracker is the only resource shared across concurrent workers;
//! all mutation goes through `reserve`/`commit`/`release`, each of which
//! holds the internal lock for the whole check-and-update so no caller
//! can observe a torn intermediate state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::worker::WorkerId;

/// Shared handle to a session budget tracker.
pub type SharedBudgetTracker = Arc<BudgetTracker>;

#[derive(Debug, Default)]
struct TrackerState {
    consumed: u64,
    reservations: HashMap<WorkerId, u64>,
}

impl TrackerState {
    fn reserved_total(&self) -> u64 {
        self.reservations.values().sum()
    }
}

/// Tracks consumed vs. available resource units for a session.
///
/// # Invariants
/// - `consumed + sum(reservations) <= total`
///
/// All mutations go through methods that enforce the invariant; a
/// reservation that would violate it is refused, never silently
/// overspent.
#[derive(Debug)]
pub struct BudgetTracker {
    total: u64,
    state: Mutex<TrackerState>,
}

impl BudgetTracker {
    /// Create a tracker for a session with the given total budget.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Create a shared tracker handle.
    pub fn shared(total: u64) -> SharedBudgetTracker {
        Arc::new(Self::new(total))
    }

    /// Create a tracker that already has `consumed` units committed
    /// (used when resuming an interrupted session).
    pub fn resumed(total: u64, consumed: u64) -> SharedBudgetTracker {
        let tracker = Self::new(total);
        {
            let mut state = tracker.state.lock().unwrap_or_else(|e| e.into_inner());
            state.consumed = consumed.min(total);
        }
        Arc::new(tracker)
    }

    /// Get the total session budget.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Get the committed (spent) amount.
    pub fn consumed(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.consumed
    }

    /// Get the budget still available for new reservations.
    ///
    /// # Property
    /// `remaining() == total - consumed - sum(reservations)`
    pub fn remaining(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.total
            .saturating_sub(state.consumed)
            .saturating_sub(state.reserved_total())
    }

    /// Whether the low-budget threshold has been crossed.
    ///
    /// True when less than 20% of the total budget remains. The
    /// orchestrator consults this before admitting each stage.
    pub fn low_budget(&self) -> bool {
        self.remaining() < self.total / 5
    }

    /// Atomically reserve `amount` units for a worker.
    ///
    /// # Postcondition
    /// On `true`, `reservations[worker] == amount` and the invariant
    /// still holds. On `false`, no state was mutated.
    pub fn reserve(&self, worker: WorkerId, amount: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let committed = state
            .consumed
            .saturating_add(state.reserved_total())
            .saturating_add(amount);
        if committed > self.total {
            tracing::debug!(%worker, amount, "budget reservation refused");
            return false;
        }

        state.reservations.insert(worker, amount);
        tracing::debug!(%worker, amount, "budget reserved");
        true
    }

    /// Convert a worker's reservation into consumed budget using its
    /// actual measured cost.
    ///
    /// The committed amount is clamped to the reservation: a worker that
    /// would overspend is force-stopped before this point, so the tracker
    /// never books an overage. Returns the amount committed. Calling
    /// `commit` for a worker with no live reservation is a no-op, which
    /// makes worker finalization idempotent.
    pub fn commit(&self, worker: WorkerId, actual_consumed: u64) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let Some(reserved) = state.reservations.remove(&worker) else {
            return 0;
        };

        let committed = actual_consumed.min(reserved);
        state.consumed = state.consumed.saturating_add(committed);
        tracing::debug!(%worker, committed, reserved, "budget committed");
        committed
    }

    /// Return a worker's full reservation to the available pool.
    ///
    /// Used on early abort or cleanup without a commit. No-op when the
    /// worker holds no reservation.
    pub fn release(&self, worker: WorkerId) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let released = state.reservations.remove(&worker).unwrap_or(0);
        if released > 0 {
            tracing::debug!(%worker, released, "budget reservation released");
        }
        released
    }

    /// Sum of all live reservations.
    pub fn reserved(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.reserved_total()
    }
}

/// Errors related to budget operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BudgetError {
    #[error("Plan needs {needed} units but only {available} remain")]
    InsufficientBudget { needed: u64, available: u64 },
}

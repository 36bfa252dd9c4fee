//! Budget allotment splitting across the workers of a plan.
//!
//! Allotments are computed by dividing a conservative estimate of total
//! task cost across worker specs, weighted by each spec's estimated
//! share of steps.

/// Split `total` proportionally across the given weights.
///
/// # Preconditions
/// - `weights` is non-empty
///
/// # Postconditions
/// - `result.len() == weights.len()`
/// - `result.iter().sum() == total`
/// - every entry is at least 1 when `total >= weights.len()`
///
/// # Pure Function
/// No side effects. Degenerate weights (all zero) fall back to an equal
/// split.
pub fn split_proportional(weights: &[f64], total: u64) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let total_weight: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total_weight <= 0.0 {
        return split_equal(weights.len(), total);
    }

    let mut allotments: Vec<u64> = weights
        .iter()
        .map(|w| {
            let share = w.max(0.0) / total_weight;
            ((total as f64) * share).floor() as u64
        })
        .collect();

    // Floor rounding can drop a few units; give the remainder to the
    // first worker so the sum stays exact.
    let allocated: u64 = allotments.iter().sum();
    let remainder = total.saturating_sub(allocated);
    if remainder > 0 {
        allotments[0] += remainder;
    }

    allotments
}

/// Split `total` evenly across `n` workers, distributing the remainder
/// one unit at a time from the front.
pub fn split_equal(n: usize, total: u64) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }

    let base = total / n as u64;
    let remainder = total % n as u64;

    let mut allotments = vec![base; n];
    for allotment in allotments.iter_mut().take(remainder as usize) {
        *allotment += 1;
    }

    allotments
}

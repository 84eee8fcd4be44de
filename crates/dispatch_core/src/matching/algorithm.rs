//! The `MatchingAlgorithm` trait: pluggable global assignment strategies.
//!
//! Implementations are stored behind `Box<dyn MatchingAlgorithm>` so
//! [`crate::matching::select_algorithm`] can swap strategies per pool
//! without the caller caring which one ran.

use super::types::{MatchContext, MatchOutcome, PoolEntry};

/// Computes a globally valid assignment (at most one job per driver, at
/// most one driver per job) over a closed pool snapshot. Implementations
/// must be deterministic given identical inputs.
pub trait MatchingAlgorithm: Send + Sync {
    fn assign(&self, pool: &[PoolEntry], ctx: &MatchContext<'_>) -> MatchOutcome;

    fn name(&self) -> &'static str;
}

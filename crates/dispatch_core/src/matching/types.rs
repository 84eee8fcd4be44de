//! Shared types for the pluggable matching algorithms.

use chrono::{DateTime, Utc};

use crate::model::{Bid, Job};

/// One job and all bids received during its auction window, ready for a
/// global matching pass. Jobs with zero bids are still represented (with
/// an empty `bids` vec) so the matcher can transition them to `NoBids`.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub job: Job,
    pub bids: Vec<Bid>,
}

/// Context shared by every candidate in a matching pass: the scorer, the
/// pluggable ETA model, and the instant the pass runs at.
pub struct MatchContext<'a> {
    pub scorer: &'a crate::scorer::Scorer,
    pub eta_model: &'a dyn crate::eta::EtaModel,
    pub now: DateTime<Utc>,
}

/// A winning (driver, job) pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub job_id: String,
    pub driver_id: String,
    pub score: f64,
    pub eta_min: f64,
    pub distance_km: f64,
}

/// The result of one global matching pass.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub assignments: Vec<Assignment>,
    /// Jobs that had at least one bid but were not assigned (their best
    /// bidder lost out to a competing job); these return to `Pending`.
    pub returned_to_pending: Vec<String>,
    /// Jobs that entered the pool with zero bids; these become `NoBids`.
    pub no_bids: Vec<String>,
}

//! Candidate scoring for the global matching pass.
//!
//! This is a distinct formula from [`crate::scorer::Scorer::utility`]:
//! §4.4 normalizes distance and completed-job-count against the pool's own
//! maxima (`d_max`, `j_max`) rather than the fixed 10km/200-job scale
//! [`crate::scorer::Scorer`] uses, so the two are implemented separately
//! and share only the idle/reliability/eta/heading/gps/spoof sub-scores.
//! Both are implemented verbatim from their respective spec sections
//! rather than collapsed into one, since nothing requires they must
//! coincide.

use crate::geo::bearing_deg;
use crate::matching::types::{MatchContext, PoolEntry};
use crate::model::Bid;
use crate::scorer::Scorer;

/// One scored (job, bid) candidate pulled out of the pool, ready for
/// sorting/assignment.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub job_index: usize,
    pub bid: Bid,
    pub score: f64,
}

/// Flattens every (job, bid) pair in the pool into scored candidates,
/// normalizing distance and completed-job-count across the whole pool
/// (zero substituted with 1).
pub fn score_pool(pool: &[PoolEntry], ctx: &MatchContext<'_>) -> Vec<ScoredCandidate> {
    let d_max = pool
        .iter()
        .flat_map(|e| e.bids.iter())
        .map(|b| b.distance_km)
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let j_max = pool
        .iter()
        .flat_map(|e| e.bids.iter())
        .map(|b| b.completed_jobs_snapshot)
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let mut out = Vec::new();
    for (job_index, entry) in pool.iter().enumerate() {
        let pickup = (entry.job.pickup_lat, entry.job.pickup_lon);
        for bid in &entry.bids {
            let score = score_candidate(pickup, bid, d_max, j_max, ctx);
            out.push(ScoredCandidate {
                job_index,
                bid: bid.clone(),
                score,
            });
        }
    }
    out
}

fn score_candidate(
    pickup: (f64, f64),
    bid: &Bid,
    d_max: f64,
    j_max: f64,
    ctx: &MatchContext<'_>,
) -> f64 {
    let w = &ctx.scorer.weights;

    let dist_term = 1.0 - (bid.distance_km / d_max).min(1.0);
    let fairness_term = 1.0 - (bid.completed_jobs_snapshot as f64 / j_max).min(1.0);
    let idle_term = Scorer::idle_bonus(bid.last_job_completed_at, ctx.now);
    let reliability_term = bid.stats_snapshot.reliability_score();
    let eta_min = ctx.eta_model.predict(bid.distance_km, ctx.now, None);
    let eta_term = Scorer::eta_score(eta_min);
    let pickup_bearing = bearing_deg((bid.driver_lat, bid.driver_lon), pickup);
    let heading_term = Scorer::heading_bonus(bid.heading, Some(pickup_bearing), w);

    let weighted = w.distance * dist_term
        + w.fairness * fairness_term
        + w.idle * idle_term
        + w.reliability * reliability_term
        + w.eta * eta_term
        + heading_term;

    let gps_penalty = Scorer::gps_penalty(bid.gps_accuracy_m);
    let spoof_penalty = Scorer::spoof_penalty(bid.spoof_risk, w.spoof_penalty_scale);

    (weighted.clamp(0.0, 1.0) * gps_penalty * spoof_penalty).clamp(0.0, 1.0)
}

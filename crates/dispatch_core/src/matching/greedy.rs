//! Greedy-by-score matching: the default [`MatchingAlgorithm`], used below
//! the pool's `hungarian_threshold`.
//!
//! Walks candidates best-score-first, skipping anything already taken,
//! rather than [`crate::matching::HungarianMatching`]'s O(n^3) assignment —
//! below threshold the extra optimality isn't worth the overhead.

use std::collections::HashSet;

use super::algorithm::MatchingAlgorithm;
use super::scoring::score_pool;
use super::types::{Assignment, MatchContext, MatchOutcome, PoolEntry};

#[derive(Debug, Default)]
pub struct GreedyMatching;

impl MatchingAlgorithm for GreedyMatching {
    fn assign(&self, pool: &[PoolEntry], ctx: &MatchContext<'_>) -> MatchOutcome {
        let mut no_bids = Vec::new();
        for entry in pool {
            if entry.bids.is_empty() {
                no_bids.push(entry.job.id.clone());
            }
        }

        let mut candidates = score_pool(pool, ctx);
        // Highest score first; ties broken by earliest bid (first-come).
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.bid.bid_ts.cmp(&b.bid.bid_ts))
        });

        let mut taken_jobs = HashSet::new();
        let mut taken_drivers = HashSet::new();
        let mut assignments = Vec::new();

        for candidate in &candidates {
            let job = &pool[candidate.job_index].job;
            if taken_jobs.contains(&job.id) || taken_drivers.contains(&candidate.bid.driver_id) {
                continue;
            }
            taken_jobs.insert(job.id.clone());
            taken_drivers.insert(candidate.bid.driver_id.clone());
            assignments.push(Assignment {
                job_id: job.id.clone(),
                driver_id: candidate.bid.driver_id.clone(),
                score: candidate.score,
                eta_min: ctx.eta_model.predict(candidate.bid.distance_km, ctx.now, None),
                distance_km: candidate.bid.distance_km,
            });
        }

        let returned_to_pending = pool
            .iter()
            .filter(|e| !e.bids.is_empty() && !taken_jobs.contains(&e.job.id))
            .map(|e| e.job.id.clone())
            .collect();

        MatchOutcome {
            assignments,
            returned_to_pending,
            no_bids,
        }
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScorerWeights;
    use crate::eta::DefaultEtaModel;
    use crate::model::{Bid, BidsSnapshot, DriverStats, Job, JobStatus, VehicleClass};
    use crate::scorer::Scorer;
    use chrono::{Duration, Utc};

    fn job(id: &str) -> Job {
        Job {
            id: id.into(),
            pickup_text: "A".into(),
            dropoff_text: "B".into(),
            pickup_lat: 52.40,
            pickup_lon: -1.50,
            dropoff_lat: 52.45,
            dropoff_lon: -1.55,
            passengers: 1,
            passenger_detail: None,
            vehicle_required: VehicleClass::Saloon,
            vehicle_override: None,
            priority: None,
            payment_method: None,
            caller_name: None,
            caller_phone: None,
            fare_estimate: None,
            bidding_window_seconds: 30,
            created_at: Utc::now(),
            status: JobStatus::Bidding,
            allocated_driver_id: None,
            driver_distance_km: None,
            driver_eta_min: None,
            bids_snapshot: BidsSnapshot::default(),
        }
    }

    fn bid(job_id: &str, driver_id: &str, distance_km: f64, bid_ts: chrono::DateTime<Utc>) -> Bid {
        Bid {
            job_id: job_id.into(),
            driver_id: driver_id.into(),
            driver_name: driver_id.into(),
            driver_lat: 52.41,
            driver_lon: -1.51,
            distance_km,
            completed_jobs_snapshot: 10,
            stats_snapshot: DriverStats::default(),
            gps_accuracy_m: 10.0,
            heading: None,
            spoof_risk: 0.0,
            last_job_completed_at: None,
            bid_ts,
            uninvited: false,
        }
    }

    fn context<'a>(scorer: &'a Scorer, eta_model: &'a DefaultEtaModel) -> MatchContext<'a> {
        MatchContext {
            scorer,
            eta_model,
            now: Utc::now(),
        }
    }

    #[test]
    fn job_with_no_bids_is_reported_separately() {
        let pool = vec![PoolEntry {
            job: job("empty"),
            bids: vec![],
        }];
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let outcome = GreedyMatching.assign(&pool, &context(&scorer, &eta_model));
        assert_eq!(outcome.no_bids, vec!["empty".to_string()]);
        assert!(outcome.assignments.is_empty());
    }

    #[test]
    fn disjoint_best_bidders_are_both_assigned() {
        let now = Utc::now();
        let pool = vec![
            PoolEntry {
                job: job("j1"),
                bids: vec![bid("j1", "d1", 1.0, now), bid("j1", "d2", 5.0, now)],
            },
            PoolEntry {
                job: job("j2"),
                bids: vec![bid("j2", "d2", 1.0, now - Duration::seconds(1))],
            },
        ];
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let outcome = GreedyMatching.assign(&pool, &context(&scorer, &eta_model));

        assert_eq!(outcome.assignments.len(), 2);
        let j1 = outcome.assignments.iter().find(|a| a.job_id == "j1").unwrap();
        assert_eq!(j1.driver_id, "d1");
        let j2 = outcome.assignments.iter().find(|a| a.job_id == "j2").unwrap();
        assert_eq!(j2.driver_id, "d2");
        assert!(outcome.returned_to_pending.is_empty());
    }

    #[test]
    fn losing_bid_on_a_contested_job_returns_it_to_pending() {
        let now = Utc::now();
        let pool = vec![
            PoolEntry {
                job: job("j1"),
                bids: vec![bid("j1", "d1", 1.0, now), bid("j1", "d2", 2.0, now)],
            },
            PoolEntry {
                job: job("j2"),
                bids: vec![bid("j2", "d1", 1.5, now)],
            },
        ];
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let outcome = GreedyMatching.assign(&pool, &context(&scorer, &eta_model));

        // d1 is the single best bidder overall and wins j1; j2 has a bid
        // but its only bidder lost out, so it returns to pending.
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].job_id, "j1");
        assert_eq!(outcome.returned_to_pending, vec!["j2".to_string()]);
    }
}

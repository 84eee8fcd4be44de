//! Pluggable global matching strategies for closed auction pools.
//!
//! `algorithm` defines the trait object surface, `greedy` and `hungarian`
//! are the two strategies [`select_algorithm`] picks between, and
//! `scoring`/`types` hold the shared candidate/outcome shapes both
//! strategies operate on.

mod algorithm;
mod greedy;
mod hungarian;
mod scoring;
mod types;

pub use algorithm::MatchingAlgorithm;
pub use greedy::GreedyMatching;
pub use hungarian::HungarianMatching;
pub use scoring::ScoredCandidate;
pub use types::{Assignment, MatchContext, MatchOutcome, PoolEntry};

/// Picks [`GreedyMatching`] below `hungarian_threshold`, [`HungarianMatching`]
/// at or above it.
pub fn select_algorithm(pool: &[PoolEntry], hungarian_threshold: usize) -> Box<dyn MatchingAlgorithm> {
    let distinct_jobs = pool.len();
    let distinct_drivers: std::collections::HashSet<&str> = pool
        .iter()
        .flat_map(|e| e.bids.iter())
        .map(|b| b.driver_id.as_str())
        .collect();

    if distinct_jobs >= hungarian_threshold || distinct_drivers.len() >= hungarian_threshold {
        Box::new(HungarianMatching)
    } else {
        Box::new(GreedyMatching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BidsSnapshot, Job, JobStatus, VehicleClass};
    use chrono::Utc;

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

    #[test]
    fn small_pool_selects_greedy() {
        let pool = vec![PoolEntry {
            job: job("j1"),
            bids: vec![],
        }];
        assert_eq!(select_algorithm(&pool, 8).name(), "greedy");
    }

    #[test]
    fn pool_at_threshold_selects_hungarian() {
        let pool: Vec<PoolEntry> = (0..8)
            .map(|i| PoolEntry {
                job: job(&format!("j{i}")),
                bids: vec![],
            })
            .collect();
        assert_eq!(select_algorithm(&pool, 8).name(), "hungarian");
    }
}

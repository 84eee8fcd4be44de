//! Commits a [`crate::matching::MatchOutcome`] to the store and publishes
//! the resulting events.
//!
//! The sole writer of `Allocated`/`Completed` job status and `OnJob` driver
//! status; invoked exclusively by the coordinator right after a matching
//! pass returns.

use tracing::{error, info, warn};

use crate::bus::{publish_json, Bus, JobResultPayload, JobStatusPayload};
use crate::matching::{MatchOutcome, PoolEntry};
use crate::metrics::Metrics;
use crate::model::{DriverStatus, JobStatus};
use crate::store::{JobStatusUpdate, Store};
use crate::topics;

/// Commits one matching pass. `cancelled` holds job ids that were
/// cancelled while the matcher was running on its snapshot: for these, no
/// assignment is committed and the original auction's bidders are told
/// `lost(reason=cancelled)` even if they would otherwise have won.
pub async fn commit(
    store: &Store,
    bus: &dyn Bus,
    metrics: &Metrics,
    pool: &[PoolEntry],
    outcome: MatchOutcome,
    cancelled: &std::collections::HashSet<String>,
) {
    for assignment in &outcome.assignments {
        if cancelled.contains(&assignment.job_id) {
            finalize_cancelled(store, bus, pool, &assignment.job_id).await;
            continue;
        }
        commit_assignment(store, bus, pool, assignment).await;
        metrics.match_made();
    }

    for job_id in &outcome.returned_to_pending {
        if cancelled.contains(job_id) {
            finalize_cancelled(store, bus, pool, job_id).await;
            continue;
        }
        if let Err(e) = update_with_retry(store, job_id, JobStatus::Pending, JobStatusUpdate::default()).await {
            error!(job_id, error = %e, "returning job to pending failed after retry");
        }
    }

    for job_id in &outcome.no_bids {
        if cancelled.contains(job_id) {
            finalize_cancelled(store, bus, pool, job_id).await;
            continue;
        }
        if update_with_retry(store, job_id, JobStatus::NoBids, JobStatusUpdate::default()).await.is_ok() {
            metrics.no_bid_job();
            let payload = JobStatusPayload {
                job: job_id.clone(),
                job_id: job_id.clone(),
                status: "no_bids".to_string(),
                dispatcher_id: None,
                reason: Some("pool_closed_with_zero_bids".to_string()),
                timestamp: chrono::Utc::now().timestamp_millis(),
            };
            let _ = publish_json(bus, &topics::job_status(job_id), &payload).await;
        }
    }
}

async fn commit_assignment(store: &Store, bus: &dyn Bus, pool: &[PoolEntry], assignment: &crate::matching::Assignment) {
    let update = JobStatusUpdate {
        allocated_driver_id: Some(assignment.driver_id.clone()),
        driver_distance_km: Some(assignment.distance_km),
        driver_eta_min: Some(assignment.eta_min),
    };
    if let Err(e) = update_with_retry(store, &assignment.job_id, JobStatus::Allocated, update).await {
        error!(job_id = %assignment.job_id, error = %e, "allocation commit failed after retry; returning to pending");
        let _ = store.update_job_status(&assignment.job_id, JobStatus::Pending, JobStatusUpdate::default());
        return;
    }
    if store.set_driver_status(&assignment.driver_id, DriverStatus::OnJob, chrono::Utc::now()).is_err() {
        warn!(driver_id = %assignment.driver_id, "allocated driver vanished from store before status could be set");
    }

    let status_payload = JobStatusPayload {
        job: assignment.job_id.clone(),
        job_id: assignment.job_id.clone(),
        status: "allocated".to_string(),
        dispatcher_id: Some(assignment.driver_id.clone()),
        reason: None,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    let _ = publish_json(bus, &topics::job_allocated(&assignment.job_id), &status_payload).await;
    info!(job_id = %assignment.job_id, driver_id = %assignment.driver_id, score = assignment.score, "job allocated");

    let Some(entry) = pool.iter().find(|e| e.job.id == assignment.job_id) else {
        return;
    };
    for bid in &entry.bids {
        let won = bid.driver_id == assignment.driver_id;
        let payload = JobResultPayload {
            job: assignment.job_id.clone(),
            job_id: assignment.job_id.clone(),
            driver_id: bid.driver_id.clone(),
            won,
            reason: if won { None } else { Some("lost".to_string()) },
            score: won.then_some(assignment.score),
            distance_km: won.then_some(assignment.distance_km),
            eta_min: won.then_some(assignment.eta_min),
            bids: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let _ = publish_json(bus, &topics::job_result(&assignment.job_id, &bid.driver_id), &payload).await;
        if won {
            let _ = publish_json(bus, &topics::driver_jobs(&bid.driver_id), &payload).await;
        }
    }
}

async fn finalize_cancelled(store: &Store, bus: &dyn Bus, pool: &[PoolEntry], job_id: &str) {
    let _ = store.update_job_status(job_id, JobStatus::Cancelled, JobStatusUpdate::default());
    let Some(entry) = pool.iter().find(|e| e.job.id == job_id) else {
        return;
    };
    for bid in &entry.bids {
        let payload = JobResultPayload {
            job: job_id.to_string(),
            job_id: job_id.to_string(),
            driver_id: bid.driver_id.clone(),
            won: false,
            reason: Some("cancelled".to_string()),
            score: None,
            distance_km: None,
            eta_min: None,
            bids: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let _ = publish_json(bus, &topics::job_result(job_id, &bid.driver_id), &payload).await;
    }
    info!(job_id, "match outcome for cancelled job discarded post-matcher");
}

/// Retries a single store write once on failure, then falls back to the
/// allocation failure mode, before the caller falls back to `Pending`.
async fn update_with_retry(
    store: &Store,
    job_id: &str,
    status: JobStatus,
    update: JobStatusUpdate,
) -> Result<(), crate::error::DispatchError> {
    match store.update_job_status(job_id, status, update.clone()) {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            store.update_job_status(job_id, status, update)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::config::SpoofConfig;
    use crate::matching::Assignment;
    use crate::model::{Bid, BidRecord, BidsSnapshot, Driver, DriverStats, Job, JobStatus, VehicleClass};
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
            status: JobStatus::Closed,
            allocated_driver_id: None,
            driver_distance_km: None,
            driver_eta_min: None,
            bids_snapshot: BidsSnapshot {
                coords_fixed: false,
                bids: vec![
                    BidRecord {
                        driver_id: "d1".into(),
                        driver_name: "D1".into(),
                        lat: 52.41,
                        lng: -1.51,
                        distance_km: 1.0,
                        completed_jobs: 0,
                        bid_time: Utc::now(),
                        score: None,
                        uninvited: false,
                    },
                    BidRecord {
                        driver_id: "d2".into(),
                        driver_name: "D2".into(),
                        lat: 52.42,
                        lng: -1.52,
                        distance_km: 2.0,
                        completed_jobs: 0,
                        bid_time: Utc::now(),
                        score: None,
                        uninvited: false,
                    },
                ],
            },
        }
    }

    fn bid(job_id: &str, driver_id: &str, distance_km: f64) -> Bid {
        Bid {
            job_id: job_id.into(),
            driver_id: driver_id.into(),
            driver_name: driver_id.into(),
            driver_lat: 52.41,
            driver_lon: -1.51,
            distance_km,
            completed_jobs_snapshot: 0,
            stats_snapshot: DriverStats::default(),
            gps_accuracy_m: 10.0,
            heading: None,
            spoof_risk: 0.0,
            last_job_completed_at: None,
            bid_ts: Utc::now(),
            uninvited: false,
        }
    }

    #[tokio::test]
    async fn winning_assignment_marks_job_allocated_and_driver_on_job() {
        let store = Store::new();
        store.create_job(job("j1")).unwrap();
        store.upsert_driver(Driver::new("d1", "D1", VehicleClass::Saloon));
        store.upsert_driver(Driver::new("d2", "D2", VehicleClass::Saloon));
        let bus = InMemoryBus::new(SpoofConfig::default().demote_sample_count);
        let pool = vec![PoolEntry {
            job: job("j1"),
            bids: vec![bid("j1", "d1", 1.0), bid("j1", "d2", 2.0)],
        }];
        let outcome = MatchOutcome {
            assignments: vec![Assignment {
                job_id: "j1".into(),
                driver_id: "d1".into(),
                score: 0.9,
                eta_min: 5.0,
                distance_km: 1.0,
            }],
            returned_to_pending: Vec::new(),
            no_bids: Vec::new(),
        };
        let metrics = Metrics::default();
        commit(&store, &bus, &metrics, &pool, outcome, &Default::default()).await;

        let job = store.get_job("j1").unwrap();
        assert_eq!(job.status, JobStatus::Allocated);
        assert_eq!(job.allocated_driver_id.as_deref(), Some("d1"));
        assert_eq!(store.get_driver("d1").unwrap().status, DriverStatus::OnJob);
    }

    #[tokio::test]
    async fn cancelled_job_is_not_committed_even_if_matcher_assigned_it() {
        let store = Store::new();
        store.create_job(job("j1")).unwrap();
        store.upsert_driver(Driver::new("d1", "D1", VehicleClass::Saloon));
        let bus = InMemoryBus::new(8);
        let pool = vec![PoolEntry {
            job: job("j1"),
            bids: vec![bid("j1", "d1", 1.0)],
        }];
        let outcome = MatchOutcome {
            assignments: vec![Assignment {
                job_id: "j1".into(),
                driver_id: "d1".into(),
                score: 0.9,
                eta_min: 5.0,
                distance_km: 1.0,
            }],
            returned_to_pending: Vec::new(),
            no_bids: Vec::new(),
        };
        let mut cancelled = std::collections::HashSet::new();
        cancelled.insert("j1".to_string());
        let metrics = Metrics::default();
        commit(&store, &bus, &metrics, &pool, outcome, &cancelled).await;

        let job = store.get_job("j1").unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.allocated_driver_id.is_none());
    }
}

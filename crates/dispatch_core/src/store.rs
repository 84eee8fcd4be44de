//! Concurrent in-memory state for drivers, jobs, bids, and locations.
//!
//! Everything concurrently mutable lives in a `DashMap` behind an `Arc`,
//! so a single `Store` clone can be shared across every task without its
//! own lock plumbing.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{DispatchError, DispatchResult};
use crate::model::{BidRecord, BidsSnapshot, Driver, DriverLocation, DriverStats, DriverStatus, Job, JobStatus, LocationSample, VehicleClass};

/// Last-N location ring size kept per driver.
const LOCATION_RING_SIZE: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct DriverFilter {
    pub status: Option<DriverStatus>,
    pub min_vehicle_class: Option<VehicleClass>,
}

impl DriverFilter {
    fn matches(&self, driver: &Driver) -> bool {
        if let Some(status) = self.status {
            if driver.status != status {
                return false;
            }
        }
        if let Some(min_class) = self.min_vehicle_class {
            if driver.vehicle_class < min_class {
                return false;
            }
        }
        true
    }
}

/// Optional fields `UpdateJobStatus` may set alongside the new status.
#[derive(Debug, Clone, Default)]
pub struct JobStatusUpdate {
    pub allocated_driver_id: Option<String>,
    pub driver_distance_km: Option<f64>,
    pub driver_eta_min: Option<f64>,
}

fn allowed_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Bidding)
            | (Pending, NoBids)
            | (Pending, Cancelled)
            | (Bidding, Closed)
            | (Bidding, Cancelled)
            | (Closed, Allocated)
            | (Closed, Pending)
            | (Closed, NoBids)
            | (Closed, Cancelled)
            | (Allocated, Completed)
            | (Allocated, Cancelled)
    ) || from == to
}

/// All durable engine state: drivers, their stats, jobs, and location rings.
/// Every method is safe under concurrent callers; reads of a single entity
/// are tear-free because `DashMap` shards serialize per-key access.
#[derive(Debug, Default)]
pub struct Store {
    drivers: DashMap<String, Driver>,
    driver_stats: DashMap<String, DriverStats>,
    jobs: DashMap<String, Job>,
    locations: DashMap<String, VecDeque<LocationSample>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_driver(&self, driver: Driver) {
        self.driver_stats.entry(driver.id.clone()).or_default();
        self.drivers.insert(driver.id.clone(), driver);
    }

    pub fn get_driver(&self, id: &str) -> Option<Driver> {
        self.drivers.get(id).map(|d| d.clone())
    }

    pub fn get_driver_stats(&self, id: &str) -> DriverStats {
        self.driver_stats.get(id).map(|s| *s).unwrap_or_default()
    }

    pub fn list_drivers(&self, filter: &DriverFilter) -> Vec<Driver> {
        self.drivers
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn create_job(&self, job: Job) -> DispatchResult<String> {
        let id = job.id.clone();
        match self.jobs.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DispatchError::DuplicateId(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(id)
            }
        }
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|j| j.clone())
    }

    /// Snapshot of every job, for watchdog sweeps. Not cheap; not called
    /// from any hot path.
    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Enforces the §4.3 transition table; a repeated update to the
    /// current status is a no-op (testable property: idempotence).
    pub fn update_job_status(&self, id: &str, new_status: JobStatus, update: JobStatusUpdate) -> DispatchResult<()> {
        let mut job = self.jobs.get_mut(id).ok_or_else(|| DispatchError::UnknownJob(id.to_string()))?;
        if job.status == new_status {
            return Ok(());
        }
        if !allowed_transition(job.status, new_status) {
            return Err(DispatchError::IllegalTransition {
                job_id: id.to_string(),
                expected: status_name(job.status),
                actual: status_name(new_status),
            });
        }
        job.status = new_status;
        if let Some(driver_id) = update.allocated_driver_id {
            job.allocated_driver_id = Some(driver_id);
        }
        if let Some(distance) = update.driver_distance_km {
            job.driver_distance_km = Some(distance);
        }
        if let Some(eta) = update.driver_eta_min {
            job.driver_eta_min = Some(eta);
        }
        Ok(())
    }

    pub fn append_bid(&self, job_id: &str, record: BidRecord) -> DispatchResult<()> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::UnknownJob(job_id.to_string()))?;
        if job.status != JobStatus::Bidding {
            return Err(DispatchError::AuctionNotOpen(job_id.to_string()));
        }
        if job.bids_snapshot.bids.iter().any(|b| b.driver_id == record.driver_id) {
            return Err(DispatchError::DuplicateBid {
                job_id: job_id.to_string(),
                driver_id: record.driver_id,
            });
        }
        job.bids_snapshot.bids.push(record);
        Ok(())
    }

    /// Idempotent: rewriting the same snapshot leaves the job unchanged.
    pub fn snapshot_bids_to_job(&self, job_id: &str, snapshot: BidsSnapshot) -> DispatchResult<()> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::UnknownJob(job_id.to_string()))?;
        job.bids_snapshot = snapshot;
        Ok(())
    }

    /// Applies a location sample if it is not older than the driver's most
    /// recent known sample; out-of-order samples are silently discarded
    /// out of order.
    pub fn push_location(&self, driver_id: &str, sample: LocationSample) {
        let mut ring = self.locations.entry(driver_id.to_string()).or_default();
        if let Some(last) = ring.back() {
            if sample.ts < last.ts {
                return;
            }
        }
        ring.push_back(sample);
        while ring.len() > LOCATION_RING_SIZE {
            ring.pop_front();
        }
        drop(ring);

        if let Some(mut driver) = self.drivers.get_mut(driver_id) {
            driver.location = Some(DriverLocation::from(sample));
        }
    }

    pub fn location_history(&self, driver_id: &str) -> Vec<LocationSample> {
        self.locations.get(driver_id).map(|r| r.iter().copied().collect()).unwrap_or_default()
    }

    pub fn set_driver_status(&self, driver_id: &str, status: DriverStatus, at: DateTime<Utc>) -> DispatchResult<()> {
        let mut driver = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| DispatchError::UnknownDriver(driver_id.to_string()))?;
        driver.status = status;
        driver.status_changed_at = at;
        Ok(())
    }

    pub fn record_job_completed(&self, driver_id: &str, completed_at: DateTime<Utc>) {
        if let Some(mut stats) = self.driver_stats.get_mut(driver_id) {
            stats.completed_jobs += 1;
        }
        if let Some(mut driver) = self.drivers.get_mut(driver_id) {
            driver.last_job_completed_at = Some(completed_at);
        }
    }

    pub fn record_job_cancelled(&self, driver_id: &str, no_show: bool) {
        if let Some(mut stats) = self.driver_stats.get_mut(driver_id) {
            stats.cancelled_jobs += 1;
            if no_show {
                stats.no_show_cancels += 1;
            }
        }
    }

    pub fn completed_job_count(&self, driver_id: &str) -> u32 {
        self.driver_stats.get(driver_id).map(|s| s.completed_jobs).unwrap_or(0)
    }
}

fn status_name(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "Pending",
        JobStatus::Bidding => "Bidding",
        JobStatus::Closed => "Closed",
        JobStatus::Allocated => "Allocated",
        JobStatus::Completed => "Completed",
        JobStatus::Cancelled => "Cancelled",
        JobStatus::NoBids => "NoBids",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VehicleClass;

    fn sample_job(id: &str) -> Job {
        Job {
            id: id.into(),
            pickup_text: "A".into(),
            dropoff_text: "B".into(),
            pickup_lat: 52.4,
            pickup_lon: -1.5,
            dropoff_lat: 52.5,
            dropoff_lon: -1.6,
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
            status: JobStatus::Pending,
            allocated_driver_id: None,
            driver_distance_km: None,
            driver_eta_min: None,
            bids_snapshot: BidsSnapshot::default(),
        }
    }

    #[test]
    fn create_job_rejects_duplicate_id() {
        let store = Store::new();
        store.create_job(sample_job("j1")).unwrap();
        let err = store.create_job(sample_job("j1")).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateId(_)));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let store = Store::new();
        store.create_job(sample_job("j1")).unwrap();
        let err = store
            .update_job_status("j1", JobStatus::Allocated, JobStatusUpdate::default())
            .unwrap_err();
        assert!(matches!(err, DispatchError::IllegalTransition { .. }));
    }

    #[test]
    fn repeated_same_status_update_is_noop() {
        let store = Store::new();
        store.create_job(sample_job("j1")).unwrap();
        store.update_job_status("j1", JobStatus::Pending, JobStatusUpdate::default()).unwrap();
        let job = store.get_job("j1").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn duplicate_bid_is_rejected() {
        let store = Store::new();
        store.create_job(sample_job("j1")).unwrap();
        store.update_job_status("j1", JobStatus::Bidding, JobStatusUpdate::default()).unwrap();
        let record = BidRecord {
            driver_id: "d1".into(),
            driver_name: "D1".into(),
            lat: 52.4,
            lng: -1.5,
            distance_km: 1.0,
            completed_jobs: 0,
            bid_time: Utc::now(),
            score: None,
            uninvited: false,
        };
        store.append_bid("j1", record.clone()).unwrap();
        let err = store.append_bid("j1", record).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateBid { .. }));
    }

    #[test]
    fn bid_rejected_when_auction_not_open() {
        let store = Store::new();
        store.create_job(sample_job("j1")).unwrap();
        let record = BidRecord {
            driver_id: "d1".into(),
            driver_name: "D1".into(),
            lat: 52.4,
            lng: -1.5,
            distance_km: 1.0,
            completed_jobs: 0,
            bid_time: Utc::now(),
            score: None,
            uninvited: false,
        };
        let err = store.append_bid("j1", record).unwrap_err();
        assert!(matches!(err, DispatchError::AuctionNotOpen(_)));
    }

    #[test]
    fn location_ring_keeps_last_four_and_drops_out_of_order() {
        let store = Store::new();
        store.upsert_driver(Driver::new("d1", "D1", VehicleClass::Saloon));
        let base = Utc::now();
        for i in 0..6 {
            store.push_location(
                "d1",
                LocationSample {
                    lat: 52.4,
                    lon: -1.5,
                    heading: None,
                    accuracy_m: 5.0,
                    ts: base + chrono::Duration::seconds(i),
                },
            );
        }
        assert_eq!(store.location_history("d1").len(), LOCATION_RING_SIZE);

        // An out-of-order sample (older than the last one kept) is dropped.
        store.push_location(
            "d1",
            LocationSample {
                lat: 10.0,
                lon: 10.0,
                heading: None,
                accuracy_m: 5.0,
                ts: base,
            },
        );
        assert_eq!(store.location_history("d1").len(), LOCATION_RING_SIZE);
        assert!(store.location_history("d1").iter().all(|s| s.lat != 10.0));
    }

    #[test]
    fn list_drivers_filters_by_status_and_vehicle_class() {
        let store = Store::new();
        let mut online = Driver::new("d1", "D1", VehicleClass::Estate);
        online.status = DriverStatus::Online;
        store.upsert_driver(online);
        let mut offline = Driver::new("d2", "D2", VehicleClass::Minibus);
        offline.status = DriverStatus::Offline;
        store.upsert_driver(offline);

        let filter = DriverFilter {
            status: Some(DriverStatus::Online),
            min_vehicle_class: Some(VehicleClass::Saloon),
        };
        let drivers = store.list_drivers(&filter);
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].id, "d1");
    }
}

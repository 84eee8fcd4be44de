//! Core data model: `Driver`, `DriverStats`, `Job`, `Bid`, `LocationSample`.
//!
//! One state enum plus one data struct per entity concern; entities are
//! identified by string ids and owned by the [`crate::store::Store`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Vehicle classes, ordered by passenger capacity (`Saloon < Estate < MPV
/// < Minibus`); a driver is eligible for a job iff their class is `>=`
/// the job's required class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Saloon,
    Estate,
    Mpv,
    Minibus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Online,
    OnJob,
}

/// Last known driver position and motion. Fields are monotonic
/// non-decreasing in `ts`; samples that arrive out of order are discarded
/// by the location ingestor before they reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub lat: f64,
    pub lon: f64,
    /// Heading in degrees, or `None` if unknown.
    pub heading: Option<f64>,
    pub gps_accuracy_m: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vehicle_class: VehicleClass,
    pub status: DriverStatus,
    pub location: Option<DriverLocation>,
    pub status_changed_at: DateTime<Utc>,
    pub last_job_completed_at: Option<DateTime<Utc>>,
}

impl Driver {
    pub fn new(id: impl Into<String>, name: impl Into<String>, vehicle_class: VehicleClass) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            vehicle_class,
            status: DriverStatus::Offline,
            location: None,
            status_changed_at: now,
            last_job_completed_at: None,
        }
    }
}

/// Per-driver reliability counters, used by [`crate::scorer::Scorer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverStats {
    pub completed_jobs: u32,
    pub cancelled_jobs: u32,
    pub no_show_cancels: u32,
    /// Fraction of solicitations accepted (bid on), in `[0, 1]`.
    pub accept_rate: f64,
    /// Average passenger rating, in `[0, 5]`.
    pub avg_rating: f64,
}

impl Default for DriverStats {
    fn default() -> Self {
        Self {
            completed_jobs: 0,
            cancelled_jobs: 0,
            no_show_cancels: 0,
            accept_rate: 1.0,
            avg_rating: 5.0,
        }
    }
}

impl DriverStats {
    /// Derived reliability score in `[0, 1]`: `0.45*(1-cancel_rate) +
    /// 0.20*(1-no_show_rate) + 0.20*accept_rate + 0.15*((rating-3.5)/1.5)`,
    /// clamped.
    pub fn reliability_score(&self) -> f64 {
        let total = (self.completed_jobs + self.cancelled_jobs).max(1) as f64;
        let cancel_rate = (self.cancelled_jobs as f64 / total).clamp(0.0, 1.0);
        let no_show_rate = (self.no_show_cancels as f64 / total).clamp(0.0, 1.0);
        let rating_term = ((self.avg_rating - 3.5) / 1.5).clamp(0.0, 1.0);
        let score = 0.45 * (1.0 - cancel_rate)
            + 0.20 * (1.0 - no_show_rate)
            + 0.20 * self.accept_rate.clamp(0.0, 1.0)
            + 0.15 * rating_term;
        score.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Bidding,
    Closed,
    Allocated,
    Completed,
    Cancelled,
    NoBids,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub pickup_text: String,
    pub dropoff_text: String,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
    pub passengers: u32,
    pub passenger_detail: Option<String>,
    pub vehicle_required: VehicleClass,
    pub vehicle_override: Option<VehicleClass>,
    /// Opaque tag, never consulted by the scorer (see Open Questions).
    pub priority: Option<String>,
    pub payment_method: Option<String>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub fare_estimate: Option<Decimal>,
    pub bidding_window_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
    pub allocated_driver_id: Option<String>,
    pub driver_distance_km: Option<f64>,
    pub driver_eta_min: Option<f64>,
    /// Serialized snapshot of the job's bids, as persisted into the store;
    /// `coords_fixed` is recorded here when geocoding repaired the
    /// coordinates at admission.
    pub bids_snapshot: BidsSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidsSnapshot {
    pub coords_fixed: bool,
    pub bids: Vec<BidRecord>,
}

/// A single bid as persisted into `Job.bids_snapshot`, matching the
/// `bids_json` column shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRecord {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "driverName")]
    pub driver_name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "distanceKm")]
    pub distance_km: f64,
    #[serde(rename = "completedJobs")]
    pub completed_jobs: u32,
    #[serde(rename = "bidTime")]
    pub bid_time: DateTime<Utc>,
    pub score: Option<f64>,
    #[serde(skip)]
    pub uninvited: bool,
}

impl Job {
    pub fn effective_vehicle_required(&self) -> VehicleClass {
        self.vehicle_override.unwrap_or(self.vehicle_required)
    }
}

/// A bid submitted by a driver for a specific job while it is in the
/// `Bidding` state. At most one bid exists per `(job_id, driver_id)`.
///
/// All scoring inputs that depend on driver state (`stats_snapshot`,
/// `gps_accuracy_m`, `heading`, `spoof_risk`, `last_job_completed_at`) are
/// captured at receipt time so the global matcher can run later over an
/// immutable snapshot without re-reading the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub job_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_lat: f64,
    pub driver_lon: f64,
    /// Computed at receipt against the job's pickup location.
    pub distance_km: f64,
    pub completed_jobs_snapshot: u32,
    pub stats_snapshot: DriverStats,
    pub gps_accuracy_m: f64,
    pub heading: Option<f64>,
    pub spoof_risk: f64,
    pub last_job_completed_at: Option<DateTime<Utc>>,
    pub bid_ts: DateTime<Utc>,
    /// Set when the driver was not in the job's invitation set; the
    /// matcher may still consider the bid, but policy may demote it.
    pub uninvited: bool,
}

/// A single GPS/status sample, kept as a short per-driver ring (>= 2
/// samples) for spoof plausibility checks. Exclusively owned by the
/// store; [`crate::spoof::SpoofDetector`] only ever sees clones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lon: f64,
    pub heading: Option<f64>,
    pub accuracy_m: f64,
    pub ts: DateTime<Utc>,
}

impl From<LocationSample> for DriverLocation {
    fn from(s: LocationSample) -> Self {
        DriverLocation {
            lat: s.lat,
            lon: s.lon,
            heading: s.heading,
            gps_accuracy_m: s.accuracy_m,
            ts: s.ts,
        }
    }
}

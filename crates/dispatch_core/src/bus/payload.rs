//! Wire payloads for bus messages, following the canonical field table.
//!
//! Emitters populate both the primary and legacy-alias fields until a
//! deprecation milestone; receivers accept either. This file
//! only covers outbound (published) shapes — inbound normalization lives
//! in [`crate::ingest::normalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BidRecord, Job};

/// Published on `drivers/{id}/bid-request` and `pubs/requests/{jobId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolicitationPayload {
    pub job: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "pickupLat")]
    pub pickup_lat: f64,
    #[serde(rename = "pickupLng")]
    pub pickup_lng: f64,
    #[serde(rename = "pickupAddress")]
    pub pickup_address: String,
    pub dropoff: String,
    #[serde(rename = "dropoffLat")]
    pub dropoff_lat: f64,
    #[serde(rename = "dropoffLng")]
    pub dropoff_lng: f64,
    pub passengers: u32,
    #[serde(rename = "biddingWindowSec")]
    pub bidding_window_sec: u64,
    pub timestamp: i64,
    pub version: u32,
}

impl SolicitationPayload {
    pub fn from_job(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            job: job.id.clone(),
            job_id: job.id.clone(),
            lat: job.pickup_lat,
            lng: job.pickup_lon,
            pickup_lat: job.pickup_lat,
            pickup_lng: job.pickup_lon,
            pickup_address: job.pickup_text.clone(),
            dropoff: job.dropoff_text.clone(),
            dropoff_lat: job.dropoff_lat,
            dropoff_lng: job.dropoff_lon,
            passengers: job.passengers,
            bidding_window_sec: job.bidding_window_seconds,
            timestamp: now.timestamp_millis(),
            version: 1,
        }
    }
}

/// Published on `drivers/{id}/jobs`, `jobs/{id}/allocated`, and
/// `jobs/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusPayload {
    pub job: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub status: String,
    #[serde(rename = "dispatcherId")]
    pub dispatcher_id: Option<String>,
    pub reason: Option<String>,
    pub timestamp: i64,
}

/// Published on `jobs/{id}/result/{driverId}`: winner or loser outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultPayload {
    pub job: String,
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(rename = "driverId")]
    pub driver_id: String,
    pub won: bool,
    pub reason: Option<String>,
    pub score: Option<f64>,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    #[serde(rename = "etaMin")]
    pub eta_min: Option<f64>,
    pub bids: Vec<BidRecord>,
    pub timestamp: i64,
}

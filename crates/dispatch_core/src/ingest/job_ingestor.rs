//! Consumes ride requests from a bounded channel, normalizes, validates,
//! geocodes, and hands admitted jobs to the [`crate::coordinator::BiddingCoordinator`].
//!
//! A long-lived async task draining an `mpsc` channel: each submission is
//! normalized, coordinate-validated (with a geocode repair fallback), and
//! turned into a `Job` before it ever reaches the store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::normalize::{normalize, JobRequest, RawSubmission};
use crate::config::GeocodeConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::geo::{is_valid_coordinate, repair_coordinates, Geocoder, RegionHint};
use crate::model::{BidsSnapshot, Job, JobStatus};
use crate::store::Store;

/// A submission accepted onto the intake queue, paired with a reply
/// channel so the submitter gets a synchronous admission result.
pub struct Submission {
    pub raw: RawSubmission,
    pub region_hint: RegionHint,
    pub reply: tokio::sync::oneshot::Sender<DispatchResult<String>>,
}

/// Bounded front door to the engine. `try_send`-based so a saturated
/// queue rejects new submissions with `Busy` rather than blocking
/// (backpressure: the intake queue has a bounded capacity).
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<Submission>,
}

impl IntakeHandle {
    pub async fn submit(&self, raw: RawSubmission, region_hint: RegionHint) -> DispatchResult<String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let submission = Submission {
            raw,
            region_hint,
            reply: reply_tx,
        };
        self.tx.try_send(submission).map_err(|_| DispatchError::Busy)?;
        reply_rx.await.map_err(|_| DispatchError::Admission("ingestor task stopped".to_string()))?
    }
}

/// Spawns the job-ingestion task and returns a handle to submit requests
/// to it. `on_admitted` is invoked with each admitted job id so the
/// caller (typically the coordinator) can open its auction.
pub fn spawn(
    store: Arc<Store>,
    geocoder: Arc<dyn Geocoder>,
    geocode_cfg: GeocodeConfig,
    queue_capacity: usize,
    on_admitted: mpsc::Sender<String>,
) -> IntakeHandle {
    let (tx, mut rx) = mpsc::channel::<Submission>(queue_capacity);

    tokio::spawn(async move {
        while let Some(submission) = rx.recv().await {
            let result = admit(&store, geocoder.as_ref(), &geocode_cfg, submission.raw, &submission.region_hint).await;
            match &result {
                Ok(job_id) => {
                    if on_admitted.send(job_id.clone()).await.is_err() {
                        warn!("coordinator channel closed; admitted job will not open an auction");
                    }
                }
                Err(e) => warn!(error = %e, "job submission rejected"),
            }
            let _ = submission.reply.send(result);
        }
    });

    IntakeHandle { tx }
}

#[instrument(skip(store, geocoder, cfg, raw, hint))]
async fn admit(
    store: &Store,
    geocoder: &dyn Geocoder,
    cfg: &GeocodeConfig,
    raw: RawSubmission,
    hint: &RegionHint,
) -> DispatchResult<String> {
    let request: JobRequest = normalize(&raw)?;

    // A phone-derived hint overrides whatever the submission channel
    // passed in.
    let phone_hint = request.caller_phone.as_deref().map(RegionHint::from_phone).unwrap_or_default();
    let hint = if phone_hint.0.is_some() { &phone_hint } else { hint };

    let (pickup, dropoff, coords_fixed) = if is_valid_coordinate(request.pickup_lat, request.pickup_lon)
        && is_valid_coordinate(request.dropoff_lat, request.dropoff_lon)
    {
        ((request.pickup_lat, request.pickup_lon), (request.dropoff_lat, request.dropoff_lon), false)
    } else {
        repair_coordinates(
            geocoder,
            &request.pickup_text,
            &request.dropoff_text,
            (request.pickup_lat, request.pickup_lon),
            (request.dropoff_lat, request.dropoff_lon),
            hint,
            cfg,
        )
        .await
    };

    if !is_valid_coordinate(pickup.0, pickup.1) {
        return Err(DispatchError::InvalidCoordinates);
    }

    let id = Uuid::new_v4().simple().to_string()[..12].to_string();
    let job = Job {
        id: id.clone(),
        pickup_text: request.pickup_text,
        dropoff_text: request.dropoff_text,
        pickup_lat: pickup.0,
        pickup_lon: pickup.1,
        dropoff_lat: dropoff.0,
        dropoff_lon: dropoff.1,
        passengers: request.passengers,
        passenger_detail: request.passenger_detail,
        vehicle_required: crate::model::VehicleClass::Saloon,
        vehicle_override: request.vehicle_override,
        priority: request.priority,
        payment_method: request.payment_method,
        caller_name: request.caller_name,
        caller_phone: request.caller_phone,
        fare_estimate: request.fare_estimate,
        bidding_window_seconds: request.bidding_window_seconds,
        created_at: chrono::Utc::now(),
        status: JobStatus::Pending,
        allocated_driver_id: None,
        driver_distance_km: None,
        driver_eta_min: None,
        bids_snapshot: BidsSnapshot {
            coords_fixed,
            bids: Vec::new(),
        },
    };

    store.create_job(job)?;
    info!(job_id = %id, coords_fixed, "job admitted");
    Ok(id)
}

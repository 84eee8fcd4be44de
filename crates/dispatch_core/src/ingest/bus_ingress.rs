//! Subscribes to the engine's inbound bus topics and routes each message
//! into the same internal handles a local caller would use: driver GPS/
//! status onto [`DriverEvent`], ride-request submissions onto
//! [`IntakeHandle`], and driver bids onto [`CoordinatorHandle::record_bid`].
//!
//! One `tokio::spawn`ed loop per topic, each over its own
//! `Bus::subscribe` stream so a slow or malformed message on one topic
//! never stalls the others.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use super::job_ingestor::IntakeHandle;
use super::location_ingestor::DriverEvent;
use super::normalize::RawSubmission;
use crate::bus::Bus;
use crate::coordinator::CoordinatorHandle;
use crate::geo::RegionHint;
use crate::model::{DriverStatus, LocationSample};
use crate::store::Store;
use crate::topics;

/// Dependencies for the inbound bus-routing tasks.
pub struct BusIngressDeps {
    pub bus: Arc<dyn Bus>,
    pub store: Arc<Store>,
    pub intake: IntakeHandle,
    pub driver_events: mpsc::Sender<DriverEvent>,
    pub coordinator: CoordinatorHandle,
    pub job_topic_prefix: String,
}

/// Spawns one subscription-routing task per subscribed topic and returns
/// immediately; each task runs until its subscription closes.
pub fn spawn(deps: BusIngressDeps) {
    spawn_driver_location(deps.bus.clone(), deps.driver_events.clone());
    spawn_driver_status(deps.bus.clone(), deps.driver_events);
    spawn_job_submissions(deps.bus.clone(), deps.store.clone(), deps.intake.clone(), topics::TAXI_BOOKINGS.to_string());
    spawn_job_submissions(
        deps.bus.clone(),
        deps.store,
        deps.intake,
        topics::job_submission_wildcard(&deps.job_topic_prefix),
    );
    spawn_job_bids(deps.bus.clone(), deps.coordinator.clone(), topics::JOB_BID_WILDCARD.to_string());
    // `jobs/{id}/response` carries the same driver-reply shape as
    // `jobs/{id}/bid`; both feed the same auction via record_bid.
    spawn_job_bids(deps.bus, deps.coordinator, topics::JOB_RESPONSE_WILDCARD.to_string());
}

/// Second `/`-delimited segment of a topic, i.e. the id in
/// `drivers/{id}/location` or `jobs/{id}/bid`.
fn topic_id(topic: &str) -> Option<&str> {
    topic.split('/').nth(1)
}

#[derive(Debug, Deserialize)]
struct LocationUpdatePayload {
    lat: f64,
    #[serde(alias = "lon")]
    lng: f64,
    heading: Option<f64>,
    #[serde(alias = "accuracyM")]
    accuracy_m: Option<f64>,
    /// Epoch milliseconds; defaults to arrival time if absent.
    timestamp: Option<i64>,
}

impl From<LocationUpdatePayload> for LocationSample {
    fn from(p: LocationUpdatePayload) -> Self {
        let ts = p
            .timestamp
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .unwrap_or_else(chrono::Utc::now);
        LocationSample {
            lat: p.lat,
            lon: p.lng,
            heading: p.heading,
            accuracy_m: p.accuracy_m.unwrap_or(0.0),
            ts,
        }
    }
}

fn spawn_driver_location(bus: Arc<dyn Bus>, driver_events: mpsc::Sender<DriverEvent>) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe(topics::DRIVER_LOCATION_WILDCARD).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to driver location topic");
                return;
            }
        };
        while let Some(msg) = sub.recv().await {
            let Some(driver_id) = topic_id(&msg.topic) else { continue };
            match serde_json::from_slice::<LocationUpdatePayload>(&msg.payload) {
                Ok(payload) => {
                    let event = DriverEvent::Location {
                        driver_id: driver_id.to_string(),
                        sample: payload.into(),
                    };
                    if driver_events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(topic = %msg.topic, error = %e, "malformed driver location payload"),
            }
        }
    });
}

#[derive(Debug, Deserialize)]
struct StatusUpdatePayload {
    status: String,
}

fn parse_driver_status(raw: &str) -> Option<DriverStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "online" => Some(DriverStatus::Online),
        "offline" => Some(DriverStatus::Offline),
        "on_job" | "onjob" | "on-job" => Some(DriverStatus::OnJob),
        _ => None,
    }
}

fn spawn_driver_status(bus: Arc<dyn Bus>, driver_events: mpsc::Sender<DriverEvent>) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe(topics::DRIVER_STATUS_WILDCARD).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to driver status topic");
                return;
            }
        };
        while let Some(msg) = sub.recv().await {
            let Some(driver_id) = topic_id(&msg.topic) else { continue };
            match serde_json::from_slice::<StatusUpdatePayload>(&msg.payload) {
                Ok(payload) => match parse_driver_status(&payload.status) {
                    Some(status) => {
                        let event = DriverEvent::Status { driver_id: driver_id.to_string(), status };
                        if driver_events.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => warn!(topic = %msg.topic, status = %payload.status, "unrecognized driver status value"),
                },
                Err(e) => warn!(topic = %msg.topic, error = %e, "malformed driver status payload"),
            }
        }
    });
}

fn spawn_job_submissions(bus: Arc<dyn Bus>, store: Arc<Store>, intake: IntakeHandle, topic: String) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe(&topic).await {
            Ok(s) => s,
            Err(e) => {
                warn!(topic, error = %e, "failed to subscribe to job submission topic");
                return;
            }
        };
        while let Some(msg) = sub.recv().await {
            let raw: RawSubmission = match serde_json::from_slice(&msg.payload) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(topic = %msg.topic, error = %e, "malformed job submission payload");
                    continue;
                }
            };
            // Our own published solicitations carry an existing job id on
            // this same prefix; without this check a solicitation would
            // loop back in as a fresh booking.
            let echoed_job_id = raw.fields.get("job").or_else(|| raw.fields.get("jobId")).and_then(|v| v.as_str());
            if let Some(job_id) = echoed_job_id {
                if store.get_job(job_id).is_some() {
                    continue;
                }
            }
            if let Err(e) = intake.submit(raw, RegionHint::default()).await {
                warn!(topic = %msg.topic, error = %e, "bus-submitted job rejected");
            }
        }
    });
}

#[derive(Debug, Deserialize)]
struct BidSubmissionPayload {
    #[serde(alias = "driverId")]
    driver_id: String,
    #[serde(alias = "driverLat")]
    lat: f64,
    #[serde(alias = "driverLng", alias = "lon")]
    lng: f64,
}

fn spawn_job_bids(bus: Arc<dyn Bus>, coordinator: CoordinatorHandle, topic: String) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe(&topic).await {
            Ok(s) => s,
            Err(e) => {
                warn!(topic, error = %e, "failed to subscribe to job bid topic");
                return;
            }
        };
        while let Some(msg) = sub.recv().await {
            let Some(job_id) = topic_id(&msg.topic) else { continue };
            match serde_json::from_slice::<BidSubmissionPayload>(&msg.payload) {
                Ok(payload) => {
                    coordinator.record_bid(job_id.to_string(), payload.driver_id, payload.lat, payload.lng).await;
                }
                Err(e) => warn!(topic = %msg.topic, error = %e, "malformed bid submission payload"),
            }
        }
    });
}

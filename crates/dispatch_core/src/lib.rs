//! Dispatch engine core: ingestion, concurrent per-job auctions, and
//! global driver/job matching, for a taxi fleet dispatch platform.
//!
//! One module per concern; this file only wires the long-lived tasks
//! (ingestors, bus ingress, coordinator, watchdog) together behind the
//! [`Engine`] handle.

pub mod allocator;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod eta;
pub mod geo;
pub mod ingest;
pub mod matching;
pub mod metrics;
pub mod model;
pub mod scorer;
pub mod spoof;
pub mod store;
pub mod topics;
pub mod watchdog;

use std::sync::Arc;

use tracing::info;

use crate::config::DispatchConfig;
use crate::coordinator::{CoordinatorDeps, CoordinatorHandle};
use crate::eta::{DefaultEtaModel, EtaModel};
use crate::geo::{Geocoder, NullGeocoder};
use crate::ingest::{BusIngressDeps, IntakeHandle, DriverEvent};
use crate::metrics::Metrics;
use crate::store::Store;

/// A fully wired, running dispatch engine: every background task spawned,
/// handles kept for submitting work and for graceful shutdown.
pub struct Engine {
    pub store: Arc<Store>,
    pub bus: Arc<dyn bus::Bus>,
    pub intake: IntakeHandle,
    pub driver_events: tokio::sync::mpsc::Sender<DriverEvent>,
    pub coordinator: CoordinatorHandle,
    pub metrics: Arc<Metrics>,
    watchdog_shutdown: tokio::sync::watch::Sender<bool>,
}

impl Engine {
    /// Wires up an engine against an in-process [`bus::InMemoryBus`] and a
    /// [`NullGeocoder`] (coordinates that don't validate fall back to
    /// `config.geocode`'s default). Swap `bus`/`geocoder` via
    /// [`Engine::with_dependencies`] for a production NATS-backed process.
    pub fn start(config: DispatchConfig) -> Self {
        let bus: Arc<dyn bus::Bus> = Arc::new(bus::InMemoryBus::new(config.bus_retry.subscriber_buffer));
        let eta_model: Arc<dyn EtaModel> = Arc::new(DefaultEtaModel::default());
        let geocoder: Arc<dyn Geocoder> = Arc::new(NullGeocoder);
        Self::with_dependencies(config, bus, eta_model, geocoder)
    }

    pub fn with_dependencies(
        config: DispatchConfig,
        bus: Arc<dyn bus::Bus>,
        eta_model: Arc<dyn EtaModel>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let store = Arc::new(Store::new());
        let metrics = Arc::new(Metrics::default());

        let (driver_tx, spoof_risk) = ingest::location_ingestor::spawn(store.clone(), config.spoof, metrics.clone());

        let (admitted_tx, mut admitted_rx) = tokio::sync::mpsc::channel::<String>(config.bidding.intake_queue_capacity);
        let intake = ingest::job_ingestor::spawn(
            store.clone(),
            geocoder,
            config.geocode,
            config.bidding.intake_queue_capacity,
            admitted_tx,
        );

        let coordinator = coordinator::spawn(CoordinatorDeps {
            store: store.clone(),
            bus: bus.clone(),
            bidding: config.bidding,
            scorer_weights: config.scorer_weights,
            eta_model,
            spoof_risk,
            metrics: metrics.clone(),
        });

        let coordinator_for_admission = coordinator.clone();
        let store_for_admission = store.clone();
        tokio::spawn(async move {
            while let Some(job_id) = admitted_rx.recv().await {
                if let Some(job) = store_for_admission.get_job(&job_id) {
                    coordinator_for_admission.open_auction(job).await;
                } else {
                    tracing::warn!(job_id, "admitted job vanished before its auction could open");
                }
            }
        });

        let watchdog_shutdown = watchdog::spawn(store.clone(), coordinator.clone(), config.watchdog);

        ingest::bus_ingress::spawn(BusIngressDeps {
            bus: bus.clone(),
            store: store.clone(),
            intake: intake.clone(),
            driver_events: driver_tx.clone(),
            coordinator: coordinator.clone(),
            job_topic_prefix: config.job_topic_prefix.clone(),
        });

        info!("dispatch engine started");
        Self {
            store,
            bus,
            intake,
            driver_events: driver_tx,
            coordinator,
            metrics,
            watchdog_shutdown,
        }
    }

    /// Signals all three watchdog loops to stop after their current tick.
    pub fn shutdown(&self) {
        let _ = self.watchdog_shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::RegionHint;
    use crate::ingest::RawSubmission;
    use crate::model::{Driver, DriverStatus, VehicleClass};
    use serde_json::json;

    #[tokio::test]
    async fn submitted_job_opens_an_auction_and_can_be_bid_on() {
        let engine = Engine::start(DispatchConfig::default());
        engine.store.upsert_driver({
            let mut d = Driver::new("d1", "D1", VehicleClass::Saloon);
            d.status = DriverStatus::Online;
            d
        });
        engine.driver_events
            .send(DriverEvent::Location {
                driver_id: "d1".into(),
                sample: crate::model::LocationSample {
                    lat: 52.41,
                    lon: -1.51,
                    heading: None,
                    accuracy_m: 5.0,
                    ts: chrono::Utc::now(),
                },
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let raw: RawSubmission = serde_json::from_value(json!({
            "pickupAddress": "Coventry Railway Station",
            "dropoff": "Birmingham Airport",
            "pickupLat": 52.4006,
            "pickupLng": -1.5137,
            "dropoffLat": 52.4539,
            "dropoffLng": -1.7480,
        }))
        .unwrap();
        let job_id = engine.intake.submit(raw, RegionHint::default()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let job = engine.store.get_job(&job_id).unwrap();
        assert_eq!(job.status, crate::model::JobStatus::Bidding);

        engine.coordinator.record_bid(job_id, "d1".into(), 52.41, -1.51).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        engine.shutdown();
    }
}

//! Consumes driver GPS/status events, updates the [`Store`], and feeds
//! each sample through the [`SpoofDetector`].
//!
//! Location rings are single-writer (this task) / multi-reader, per
//! Out-of-order samples are dropped inside [`Store::push_location`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::SpoofConfig;
use crate::metrics::Metrics;
use crate::model::{DriverStatus, LocationSample};
use crate::spoof::SpoofDetector;
use crate::store::Store;

/// A driver GPS or status update arriving off the bus.
pub enum DriverEvent {
    Location { driver_id: String, sample: LocationSample },
    Status { driver_id: String, status: DriverStatus },
}

/// Spawns the location-ingestion task. Returns a sender for driver events
/// and a shared map of current spoof risk, read by the bidding path when
/// scoring bids (the spoof_risk input).
pub fn spawn(
    store: Arc<Store>,
    spoof_cfg: SpoofConfig,
    metrics: Arc<Metrics>,
) -> (mpsc::Sender<DriverEvent>, Arc<dashmap::DashMap<String, f64>>) {
    let (tx, mut rx) = mpsc::channel::<DriverEvent>(4096);
    let spoof_risk: Arc<dashmap::DashMap<String, f64>> = Arc::new(dashmap::DashMap::new());
    let risk_handle = spoof_risk.clone();

    tokio::spawn(async move {
        let detector = SpoofDetector::new(spoof_cfg);
        let mut recent_risks: HashMap<String, Vec<f64>> = HashMap::new();

        while let Some(event) = rx.recv().await {
            match event {
                DriverEvent::Location { driver_id, sample } => {
                    let prev = store.location_history(&driver_id).into_iter().last();
                    let now = Utc::now();
                    let verdict = detector.evaluate(prev.as_ref(), &sample, now);
                    spoof_risk.insert(driver_id.clone(), verdict.risk);

                    let history = recent_risks.entry(driver_id.clone()).or_default();
                    history.push(verdict.risk);
                    if history.len() > 8 {
                        history.remove(0);
                    }

                    store.push_location(&driver_id, sample);

                    if detector.should_demote(history) {
                        if store.set_driver_status(&driver_id, DriverStatus::Offline, now).is_ok() {
                            metrics.spoof_demotion();
                            warn!(driver_id, risk = verdict.risk, "driver demoted to offline: sustained spoof risk");
                        }
                    }
                }
                DriverEvent::Status { driver_id, status } => {
                    let now = Utc::now();
                    if store.set_driver_status(&driver_id, status, now).is_ok() {
                        info!(driver_id, ?status, "driver status updated");
                    } else {
                        warn!(driver_id, "status update for unknown driver ignored");
                    }
                }
            }
        }
    });

    (tx, risk_handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Driver, VehicleClass};

    #[tokio::test]
    async fn location_update_is_applied_to_driver_and_spoof_map() {
        let store = Arc::new(Store::new());
        store.upsert_driver(Driver::new("d1", "D1", VehicleClass::Saloon));
        let (tx, spoof_risk) = spawn(store.clone(), SpoofConfig::default(), Arc::new(crate::metrics::Metrics::default()));

        tx.send(DriverEvent::Location {
            driver_id: "d1".into(),
            sample: LocationSample {
                lat: 52.4,
                lon: -1.5,
                heading: None,
                accuracy_m: 5.0,
                ts: Utc::now(),
            },
        })
        .await
        .unwrap();

        // Give the spawned task a chance to drain the channel.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(spoof_risk.contains_key("d1"));
        assert_eq!(store.location_history("d1").len(), 1);
    }

    #[tokio::test]
    async fn status_update_changes_driver_status() {
        let store = Arc::new(Store::new());
        store.upsert_driver(Driver::new("d1", "D1", VehicleClass::Saloon));
        let (tx, _spoof_risk) = spawn(store.clone(), SpoofConfig::default(), Arc::new(crate::metrics::Metrics::default()));

        tx.send(DriverEvent::Status {
            driver_id: "d1".into(),
            status: DriverStatus::Online,
        })
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(store.get_driver("d1").unwrap().status, DriverStatus::Online);
    }
}

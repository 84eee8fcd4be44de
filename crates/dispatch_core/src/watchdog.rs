//! Three independent periodic reapers: stuck auctions,
//! driver liveness, and stalled `Allocated` jobs.
//!
//! Each reaper runs on its own interval and shuts down on a shared
//! `tokio::sync::watch` cancellation signal, checked with `tokio::select!`
//! alongside the timer tick.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::WatchdogConfig;
use crate::coordinator::CoordinatorHandle;
use crate::model::{DriverStatus, JobStatus};
use crate::store::{JobStatusUpdate, Store};

/// Spawns the three watchdog tasks. Returns a `watch::Sender<bool>`; send
/// `true` to ask all three to stop after their current tick.
pub fn spawn(store: Arc<Store>, coordinator: CoordinatorHandle, cfg: WatchdogConfig) -> tokio::sync::watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(stuck_auction_reaper(coordinator, cfg, shutdown_rx.clone()));
    tokio::spawn(driver_liveness_reaper(store.clone(), cfg, shutdown_rx.clone()));
    tokio::spawn(stalled_allocation_reaper(store, cfg, shutdown_rx));

    shutdown_tx
}

async fn stuck_auction_reaper(coordinator: CoordinatorHandle, cfg: WatchdogConfig, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(cfg.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => run_stuck_auction_pass(&coordinator, cfg).await,
            _ = shutdown.changed() => if *shutdown.borrow() { return },
        }
    }
}

#[instrument(skip(coordinator, cfg))]
async fn run_stuck_auction_pass(coordinator: &CoordinatorHandle, cfg: WatchdogConfig) {
    let grace = chrono::Duration::from_std(cfg.expiry_grace).unwrap_or(chrono::Duration::seconds(5));
    for job_id in coordinator.overdue_auctions(grace) {
        warn!(job_id, "auction window overdue; force-expiring");
        coordinator.force_expire_if_overdue(&job_id, grace).await;
    }
}

async fn driver_liveness_reaper(store: Arc<Store>, cfg: WatchdogConfig, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(cfg.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => run_driver_liveness_pass(&store, cfg),
            _ = shutdown.changed() => if *shutdown.borrow() { return },
        }
    }
}

#[instrument(skip(store, cfg))]
fn run_driver_liveness_pass(store: &Store, cfg: WatchdogConfig) {
    let now = chrono::Utc::now();
    let timeout = chrono::Duration::from_std(cfg.driver_liveness_timeout).unwrap_or(chrono::Duration::seconds(120));
    for driver in store.list_drivers(&Default::default()) {
        if driver.status != DriverStatus::Online {
            continue;
        }
        let stale = match driver.location {
            Some(loc) => now - loc.ts > timeout,
            None => now - driver.status_changed_at > timeout,
        };
        if stale && store.set_driver_status(&driver.id, DriverStatus::Offline, now).is_ok() {
            warn!(driver_id = %driver.id, "driver demoted to offline: no location sample within liveness window");
        }
    }
}

async fn stalled_allocation_reaper(store: Arc<Store>, cfg: WatchdogConfig, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(cfg.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => run_stalled_allocation_pass(&store, cfg),
            _ = shutdown.changed() => if *shutdown.borrow() { return },
        }
    }
}

#[instrument(skip(store, cfg))]
fn run_stalled_allocation_pass(store: &Store, cfg: WatchdogConfig) {
    let now = chrono::Utc::now();
    let max_age = chrono::Duration::from_std(cfg.max_allocated_age).unwrap_or(chrono::Duration::hours(2));
    for job in store.all_jobs() {
        if job.status != JobStatus::Allocated {
            continue;
        }
        if now - job.created_at > max_age {
            if store
                .update_job_status(&job.id, JobStatus::Completed, JobStatusUpdate::default())
                .is_ok()
            {
                if let Some(driver_id) = &job.allocated_driver_id {
                    store.record_job_completed(driver_id, now);
                    let _ = store.set_driver_status(driver_id, DriverStatus::Online, now);
                }
                info!(job_id = %job.id, "allocated job force-completed as stalled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Driver, VehicleClass};
    use std::time::Duration;

    #[test]
    fn stale_online_driver_is_demoted_to_offline() {
        let store = Store::new();
        let mut driver = Driver::new("d1", "D1", VehicleClass::Saloon);
        driver.status = DriverStatus::Online;
        driver.status_changed_at = chrono::Utc::now() - chrono::Duration::seconds(999);
        store.upsert_driver(driver);

        let cfg = WatchdogConfig {
            driver_liveness_timeout: Duration::from_secs(120),
            ..WatchdogConfig::default()
        };
        run_driver_liveness_pass(&store, cfg);
        assert_eq!(store.get_driver("d1").unwrap().status, DriverStatus::Offline);
    }

    #[test]
    fn fresh_online_driver_is_left_alone() {
        let store = Store::new();
        let mut driver = Driver::new("d1", "D1", VehicleClass::Saloon);
        driver.status = DriverStatus::Online;
        driver.status_changed_at = chrono::Utc::now();
        store.upsert_driver(driver);

        run_driver_liveness_pass(&store, WatchdogConfig::default());
        assert_eq!(store.get_driver("d1").unwrap().status, DriverStatus::Online);
    }
}

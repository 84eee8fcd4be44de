//! Per-job auction lifecycle: open, collect bids, close into a shared
//! pool, and trigger the global matcher exactly once per drain.
//!
//! Shared per-job state (the active-auction and closed-pool maps) lives
//! entirely inside one actor task that serializes every transition over an
//! `mpsc` command channel; the matcher itself runs outside that critical
//! section, over an immutable snapshot of the closed pool, so a slow
//! matching pass never blocks new bids or auction opens.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::allocator;
use crate::bus::{publish_json, Bus, JobStatusPayload, JobResultPayload, SolicitationPayload};
use crate::config::{BiddingConfig, ScorerWeights};
use crate::eta::EtaModel;
use crate::matching::{select_algorithm, MatchContext, PoolEntry};
use crate::metrics::Metrics;
use crate::model::{Bid, BidRecord, DriverStatus, Job, JobStatus};
use crate::scorer::Scorer;
use crate::store::{DriverFilter, JobStatusUpdate, Store};
use crate::topics;

enum Command {
    OpenAuction(Job),
    RecordBid { job_id: String, driver_id: String, lat: f64, lon: f64 },
    WindowExpired(String),
    Cancel(String),
}

/// Front door to the coordinator actor. Cloneable; every clone shares the
/// same underlying channel and deadline map.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    /// Per-auction deadlines, updated by the actor and read by the
    /// watchdog's stuck-auction reaper.
    deadlines: Arc<DashMap<String, DateTime<Utc>>>,
}

impl CoordinatorHandle {
    pub async fn open_auction(&self, job: Job) {
        let _ = self.tx.send(Command::OpenAuction(job)).await;
    }

    pub async fn record_bid(&self, job_id: String, driver_id: String, lat: f64, lon: f64) {
        let _ = self.tx.send(Command::RecordBid { job_id, driver_id, lat, lon }).await;
    }

    pub async fn cancel(&self, job_id: String) {
        let _ = self.tx.send(Command::Cancel(job_id)).await;
    }

    /// Force-expires a window whose timer appears to have fired without
    /// reaching the actor (crash recovery), if it is still overdue.
    pub async fn force_expire_if_overdue(&self, job_id: &str, grace: chrono::Duration) {
        if let Some(deadline) = self.deadlines.get(job_id) {
            if Utc::now() > *deadline + grace {
                let _ = self.tx.send(Command::WindowExpired(job_id.clone())).await;
            }
        }
    }

    pub fn overdue_auctions(&self, grace: chrono::Duration) -> Vec<String> {
        let now = Utc::now();
        self.deadlines
            .iter()
            .filter(|entry| now > *entry.value() + grace)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

struct ActiveAuction {
    job: Job,
    invited: HashSet<String>,
    bids: Vec<Bid>,
    cancel_token: CancellationToken,
}

/// Dependencies the actor needs to score bids and run the matcher;
/// grouped so `spawn` doesn't take an unwieldy argument list.
pub struct CoordinatorDeps {
    pub store: Arc<Store>,
    pub bus: Arc<dyn Bus>,
    pub bidding: BiddingConfig,
    pub scorer_weights: ScorerWeights,
    pub eta_model: Arc<dyn EtaModel>,
    pub spoof_risk: Arc<DashMap<String, f64>>,
    pub metrics: Arc<Metrics>,
}

pub fn spawn(deps: CoordinatorDeps) -> CoordinatorHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(4096);
    let deadlines: Arc<DashMap<String, DateTime<Utc>>> = Arc::new(DashMap::new());
    let handle = CoordinatorHandle {
        tx: tx.clone(),
        deadlines: deadlines.clone(),
    };
    let loopback = tx.clone();

    tokio::spawn(async move {
        let mut active: HashMap<String, ActiveAuction> = HashMap::new();
        let mut closed_pool: Vec<PoolEntry> = Vec::new();
        let mut pending_cancel: HashSet<String> = HashSet::new();
        let mut matching_in_flight = false;

        while let Some(command) = rx.recv().await {
            match command {
                Command::OpenAuction(job) => {
                    open_auction(&deps, &deadlines, &loopback, &mut active, job).await;
                }
                Command::RecordBid { job_id, driver_id, lat, lon } => {
                    record_bid(&deps, &mut active, &job_id, &driver_id, lat, lon).await;
                }
                Command::Cancel(job_id) => {
                    if let Some(auction) = active.remove(&job_id) {
                        auction.cancel_token.cancel();
                        deadlines.remove(&job_id);
                        cancel_active(&deps, &job_id).await;
                    } else if closed_pool.iter().any(|e| e.job.id == job_id) {
                        // Already drained into the pool; honored once the
                        // in-flight matcher returns.
                        pending_cancel.insert(job_id);
                    } else {
                        let _ = deps.store.update_job_status(&job_id, JobStatus::Cancelled, JobStatusUpdate::default());
                    }
                }
                Command::WindowExpired(job_id) => {
                    if let Some(auction) = active.remove(&job_id) {
                        deadlines.remove(&job_id);
                        if pending_cancel.remove(&job_id) {
                            cancel_active(&deps, &job_id).await;
                        } else {
                            let _ = deps.store.update_job_status(&job_id, JobStatus::Closed, JobStatusUpdate::default());
                            closed_pool.push(PoolEntry {
                                job: auction.job,
                                bids: auction.bids,
                            });
                        }
                    }

                    if active.is_empty() && !closed_pool.is_empty() && !matching_in_flight {
                        matching_in_flight = true;
                        let pool = std::mem::take(&mut closed_pool);
                        run_matcher(&deps, &mut pending_cancel, pool).await;
                        matching_in_flight = false;
                    }
                }
            }
        }
    });

    handle
}

#[instrument(skip(deps, deadlines, loopback, active, job), fields(job_id = %job.id))]
async fn open_auction(
    deps: &CoordinatorDeps,
    deadlines: &Arc<DashMap<String, DateTime<Utc>>>,
    loopback: &mpsc::Sender<Command>,
    active: &mut HashMap<String, ActiveAuction>,
    job: Job,
) {
    let job_id = job.id.clone();
    let filter = DriverFilter {
        status: Some(DriverStatus::Online),
        min_vehicle_class: Some(job.effective_vehicle_required()),
    };
    let pickup = (job.pickup_lat, job.pickup_lon);
    let invited: HashSet<String> = deps
        .store
        .list_drivers(&filter)
        .into_iter()
        .filter(|d| {
            d.location
                .map(|loc| crate::geo::haversine_km(pickup, (loc.lat, loc.lon)) <= deps.bidding.max_bid_radius_km)
                .unwrap_or(false)
        })
        .map(|d| d.id)
        .collect();

    if invited.is_empty() {
        let _ = deps.store.update_job_status(&job_id, JobStatus::NoBids, JobStatusUpdate::default());
        let payload = JobStatusPayload {
            job: job_id.clone(),
            job_id: job_id.clone(),
            status: "no_bids".to_string(),
            dispatcher_id: None,
            reason: Some("no_eligible_drivers".to_string()),
            timestamp: Utc::now().timestamp_millis(),
        };
        let _ = publish_json(deps.bus.as_ref(), &topics::job_status(&job_id), &payload).await;
        info!(job_id, "no eligible drivers; job marked NoBids");
        return;
    }

    let _ = deps.store.update_job_status(&job_id, JobStatus::Bidding, JobStatusUpdate::default());
    deps.metrics.auction_opened();

    let solicitation = SolicitationPayload::from_job(&job, Utc::now());
    let _ = publish_json(deps.bus.as_ref(), &topics::pubs_request(&job_id), &solicitation).await;
    for driver_id in &invited {
        let _ = publish_json(deps.bus.as_ref(), &topics::driver_bid_request(driver_id), &solicitation).await;
    }

    let window = std::time::Duration::from_secs(job.bidding_window_seconds);
    let deadline = Utc::now() + chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(30));
    deadlines.insert(job_id.clone(), deadline);

    let cancel_token = CancellationToken::new();
    let timer_token = cancel_token.clone();
    let timer_tx = loopback.clone();
    let timer_job_id = job_id.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(window) => {
                let _ = timer_tx.send(Command::WindowExpired(timer_job_id)).await;
            }
            _ = timer_token.cancelled() => {}
        }
    });

    active.insert(
        job_id,
        ActiveAuction {
            job,
            invited,
            bids: Vec::new(),
            cancel_token,
        },
    );
}

async fn record_bid(deps: &CoordinatorDeps, active: &mut HashMap<String, ActiveAuction>, job_id: &str, driver_id: &str, lat: f64, lon: f64) {
    let Some(auction) = active.get_mut(job_id) else {
        warn!(job_id, driver_id, "bid rejected: auction not open");
        return;
    };
    if auction.bids.iter().any(|b| b.driver_id == driver_id) {
        warn!(job_id, driver_id, "duplicate bid rejected");
        return;
    }

    let driver = deps.store.get_driver(driver_id);
    let stats = deps.store.get_driver_stats(driver_id);
    let distance_km = crate::geo::haversine_km((auction.job.pickup_lat, auction.job.pickup_lon), (lat, lon));
    let uninvited = !auction.invited.contains(driver_id);

    let bid = Bid {
        job_id: job_id.to_string(),
        driver_id: driver_id.to_string(),
        driver_name: driver.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
        driver_lat: lat,
        driver_lon: lon,
        distance_km,
        completed_jobs_snapshot: stats.completed_jobs,
        stats_snapshot: stats,
        gps_accuracy_m: driver.as_ref().and_then(|d| d.location).map(|l| l.gps_accuracy_m).unwrap_or(0.0),
        heading: driver.as_ref().and_then(|d| d.location).and_then(|l| l.heading),
        spoof_risk: deps.spoof_risk.get(driver_id).map(|r| *r).unwrap_or(0.0),
        last_job_completed_at: driver.as_ref().and_then(|d| d.last_job_completed_at),
        bid_ts: Utc::now(),
        uninvited,
    };

    let record = BidRecord {
        driver_id: bid.driver_id.clone(),
        driver_name: bid.driver_name.clone(),
        lat,
        lng: lon,
        distance_km,
        completed_jobs: bid.completed_jobs_snapshot,
        bid_time: bid.bid_ts,
        score: None,
        uninvited,
    };
    if let Err(e) = deps.store.append_bid(job_id, record) {
        warn!(job_id, driver_id, error = %e, "bid append to store failed");
        return;
    }

    auction.bids.push(bid);
    deps.metrics.bid_received();
}

async fn cancel_active(deps: &CoordinatorDeps, job_id: &str) {
    let _ = deps.store.update_job_status(job_id, JobStatus::Cancelled, JobStatusUpdate::default());
    if let Some(job) = deps.store.get_job(job_id) {
        for record in &job.bids_snapshot.bids {
            let payload = JobResultPayload {
                job: job_id.to_string(),
                job_id: job_id.to_string(),
                driver_id: record.driver_id.clone(),
                won: false,
                reason: Some("cancelled".to_string()),
                score: None,
                distance_km: None,
                eta_min: None,
                bids: Vec::new(),
                timestamp: Utc::now().timestamp_millis(),
            };
            let _ = publish_json(deps.bus.as_ref(), &topics::job_result(job_id, &record.driver_id), &payload).await;
        }
    }
    info!(job_id, "auction cancelled mid-bid");
}

#[instrument(skip(deps, pending_cancel, pool), fields(pool_size = pool.len()))]
async fn run_matcher(deps: &CoordinatorDeps, pending_cancel: &mut HashSet<String>, pool: Vec<PoolEntry>) {
    let scorer = Scorer::new(deps.scorer_weights);
    let ctx = MatchContext {
        scorer: &scorer,
        eta_model: deps.eta_model.as_ref(),
        now: Utc::now(),
    };
    let algorithm = select_algorithm(&pool, deps.bidding.hungarian_threshold);
    info!(algorithm = algorithm.name(), "running global matching pass");
    let outcome = algorithm.assign(&pool, &ctx);

    let cancelled: HashSet<String> = pool
        .iter()
        .filter(|e| pending_cancel.remove(&e.job.id))
        .map(|e| e.job.id.clone())
        .collect();

    allocator::commit(&deps.store, deps.bus.as_ref(), deps.metrics.as_ref(), &pool, outcome, &cancelled).await;
}

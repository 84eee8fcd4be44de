//! Per-concern configuration structs, each with a documented `Default`.
//!
//! Weights and thresholds are configuration, not constants baked into the
//! scoring/matching code, so operators can retune behaviour without a
//! rebuild. [`DispatchConfig::load`] layers environment variables
//! (`BROKER_URL`, `STORE_URL`, `RUST_LOG`) and an optional config file over
//! these defaults via the `config` crate.

use std::time::Duration;

/// Default UK bounding box used to validate pickup/dropoff coordinates.
pub const UK_BBOX_LAT: (f64, f64) = (49.5, 61.0);
pub const UK_BBOX_LON: (f64, f64) = (-8.5, 2.0);

/// Bidding window bounds (seconds), clamped per job.
pub const MIN_BIDDING_WINDOW_SECS: u64 = 5;
pub const MAX_BIDDING_WINDOW_SECS: u64 = 120;
pub const DEFAULT_BIDDING_WINDOW_SECS: u64 = 30;

/// Weights for [`crate::scorer::Scorer::utility`]. Each weight multiplies a
/// sub-score already clamped to `[0, 1]`; the weighted sum is then clamped
/// to `[0, 1]` and multiplied by the gps/spoof penalties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerWeights {
    pub distance: f64,
    pub fairness: f64,
    pub idle: f64,
    pub reliability: f64,
    pub eta: f64,
    /// Added (not multiplied) after the weighted sum; see heading_bonus in spec.
    pub heading_bonus_close: f64,
    pub heading_bonus_far: f64,
    pub heading_close_deg: f64,
    pub heading_far_deg: f64,
    pub spoof_penalty_scale: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            distance: 0.35,
            fairness: 0.20,
            idle: 0.10,
            reliability: 0.20,
            eta: 0.15,
            heading_bonus_close: 0.05,
            heading_bonus_far: 0.02,
            heading_close_deg: 45.0,
            heading_far_deg: 90.0,
            spoof_penalty_scale: 0.6,
        }
    }
}

/// Bidding auction behaviour: radius filter, window clamp, global-matcher
/// trigger threshold for switching from greedy to the Hungarian algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiddingConfig {
    /// Maximum haversine distance (km) from a driver to a pickup for the
    /// driver to be invited to bid.
    pub max_bid_radius_km: f64,
    pub min_window_secs: u64,
    pub max_window_secs: u64,
    pub default_window_secs: u64,
    /// Pool size (distinct jobs AND distinct bidders) at or above which the
    /// Hungarian assignment is used instead of the greedy default.
    pub hungarian_threshold: usize,
    /// Bounded intake queue depth; beyond this, new submissions are
    /// rejected with `busy`.
    pub intake_queue_capacity: usize,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            max_bid_radius_km: 10.0,
            min_window_secs: MIN_BIDDING_WINDOW_SECS,
            max_window_secs: MAX_BIDDING_WINDOW_SECS,
            default_window_secs: DEFAULT_BIDDING_WINDOW_SECS,
            hungarian_threshold: 8,
            intake_queue_capacity: 1024,
        }
    }
}

/// Spoof-risk detector thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpoofConfig {
    pub stale_after: Duration,
    pub stale_penalty: f64,
    pub speed_high_kmh: f64,
    pub speed_high_penalty: f64,
    pub speed_elevated_kmh: f64,
    pub speed_elevated_penalty: f64,
    pub static_coords_km: f64,
    pub static_coords_after: Duration,
    pub static_coords_penalty: f64,
    /// Sustained risk over this many consecutive samples demotes a driver
    /// to Offline.
    pub demote_risk_threshold: f64,
    pub demote_sample_count: usize,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(20),
            stale_penalty: 0.25,
            speed_high_kmh: 140.0,
            speed_high_penalty: 0.55,
            speed_elevated_kmh: 110.0,
            speed_elevated_penalty: 0.35,
            static_coords_km: 0.005,
            static_coords_after: Duration::from_secs(60),
            static_coords_penalty: 0.10,
            demote_risk_threshold: 0.8,
            demote_sample_count: 3,
        }
    }
}

/// Geocoding deadline and fallback coordinates when neither pickup nor
/// dropoff text resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeConfig {
    pub deadline: Duration,
    pub fallback_lat: f64,
    pub fallback_lon: f64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(5),
            // Coventry city centre; a reasonable geographic middle-ground
            // default for an unresolvable UK address.
            fallback_lat: 52.4068,
            fallback_lon: -1.5197,
        }
    }
}

/// Bus publish retry policy: exponential backoff 250ms -> 1s -> 4s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusRetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
    /// Per-topic subscriber buffer; overflow discards the oldest message
    /// with a logged warning.
    pub subscriber_buffer: usize,
}

impl Default for BusRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            backoff_factor: 4,
            subscriber_buffer: 8192,
        }
    }
}

/// Watchdog cadence and thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchdogConfig {
    pub interval: Duration,
    /// Grace period beyond a window's deadline before the reaper assumes
    /// the expiry handler crashed and force-drains it.
    pub expiry_grace: Duration,
    /// A driver whose last location sample is older than this is demoted
    /// from Online to Offline.
    pub driver_liveness_timeout: Duration,
    /// An Allocated job older than this without completing is force-marked
    /// Completed with a `stalled` annotation.
    pub max_allocated_age: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            expiry_grace: Duration::from_secs(5),
            driver_liveness_timeout: Duration::from_secs(120),
            max_allocated_age: Duration::from_secs(60 * 60 * 2),
        }
    }
}

/// Top-level configuration for a running dispatch engine process.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub broker_url: String,
    pub store_url: String,
    pub bidding: BiddingConfig,
    pub scorer_weights: ScorerWeights,
    pub spoof: SpoofConfig,
    pub geocode: GeocodeConfig,
    pub bus_retry: BusRetryConfig,
    pub watchdog: WatchdogConfig,
    /// Topic prefix for direct message-bus job submissions (JobIngestor
    /// subscribes to `{topic_prefix}/*` on this prefix).
    pub job_topic_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            broker_url: "nats://127.0.0.1:4222".to_string(),
            store_url: "memory://".to_string(),
            bidding: BiddingConfig::default(),
            scorer_weights: ScorerWeights::default(),
            spoof: SpoofConfig::default(),
            geocode: GeocodeConfig::default(),
            bus_retry: BusRetryConfig::default(),
            watchdog: WatchdogConfig::default(),
            job_topic_prefix: "pubs/requests".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from `BROKER_URL`/`STORE_URL` environment
    /// variables layered over the defaults above. An optional file path
    /// (e.g. `dispatch.toml`) is layered in first if present.
    pub fn load(config_file: Option<&str>) -> Result<Self, crate::error::DispatchError> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let layered = builder
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| crate::error::DispatchError::Config(e.to_string()))?;

        let mut cfg = Self::default();
        if let Ok(broker) = layered.get_string("broker_url") {
            cfg.broker_url = broker;
        }
        if let Ok(store) = layered.get_string("store_url") {
            cfg.store_url = store;
        }
        Ok(cfg)
    }
}

//! Pluggable ETA estimation: `(km, now, zone_id?) -> minutes`.
//!
//! The default implementation divides distance by a time-of-day-dependent
//! speed (rush hour vs. off-peak), with an optional zone discount and a
//! floor on the returned minutes.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Europe::London;

/// Converts a distance and a point in time into an ETA in minutes. `now` is
/// always given as UTC; implementations that bucket by time of day convert
/// to UK local time themselves so the rush-hour window tracks BST/GMT.
/// Implementations must be pure (no hidden I/O) so they can run on the
/// hot bid-scoring path.
pub trait EtaModel: Send + Sync {
    fn predict(&self, distance_km: f64, now: DateTime<Utc>, zone_id: Option<&str>) -> f64;
}

/// Rush-hour windows (local hour, inclusive start / exclusive end) and the
/// corresponding average speed in km/h.
#[derive(Debug, Clone, Copy)]
pub struct DefaultEtaModel {
    pub rush_hour_speed_kmh: f64,
    pub offpeak_speed_kmh: f64,
    pub zone_discount: f64,
    pub min_minutes: f64,
}

impl Default for DefaultEtaModel {
    fn default() -> Self {
        Self {
            rush_hour_speed_kmh: 22.0,
            offpeak_speed_kmh: 28.0,
            zone_discount: 0.10,
            min_minutes: 2.0,
        }
    }
}

fn is_rush_hour(now: DateTime<Utc>) -> bool {
    let local_hour = now.with_timezone(&London).hour();
    (7..9).contains(&local_hour) || (16..18).contains(&local_hour)
}

impl EtaModel for DefaultEtaModel {
    fn predict(&self, distance_km: f64, now: DateTime<Utc>, zone_id: Option<&str>) -> f64 {
        let base_speed = if is_rush_hour(now) {
            self.rush_hour_speed_kmh
        } else {
            self.offpeak_speed_kmh
        };
        let speed = if zone_id.is_some() {
            base_speed * (1.0 - self.zone_discount)
        } else {
            base_speed
        };
        let minutes = (distance_km.max(0.0) / speed) * 60.0;
        minutes.max(self.min_minutes).ceil()
    }
}

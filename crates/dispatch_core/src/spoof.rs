//! Per-driver rolling GPS plausibility check.
//!
//! Accumulates named penalty components (staleness, implausible speed,
//! suspiciously static coordinates) into a risk score clamped to `[0,1]`;
//! sustained high risk demotes a driver to Offline.

use chrono::{DateTime, Utc};

use crate::config::SpoofConfig;
use crate::geo::haversine_km;
use crate::model::LocationSample;

/// A named contributor to a driver's spoof risk, surfaced for operator
/// diagnostics and the demotion-decision log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoofFlag {
    StaleLocation,
    SpeedHigh,
    SpeedElevated,
    StaticCoords,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpoofVerdict {
    pub risk: f64,
    pub flags: [Option<SpoofFlag>; 3],
}

impl SpoofVerdict {
    pub fn flags(&self) -> impl Iterator<Item = SpoofFlag> + '_ {
        self.flags.iter().filter_map(|f| *f)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpoofDetector {
    cfg: SpoofConfig,
}

impl SpoofDetector {
    pub fn new(cfg: SpoofConfig) -> Self {
        Self { cfg }
    }

    /// Evaluate a new sample against the previous one (if any) and the
    /// current time, returning a clamped `[0,1]` risk and the flags that
    /// contributed to it.
    pub fn evaluate(
        &self,
        prev: Option<&LocationSample>,
        current: &LocationSample,
        now: DateTime<Utc>,
    ) -> SpoofVerdict {
        let mut risk = 0.0;
        let mut flags: Vec<SpoofFlag> = Vec::with_capacity(3);

        if (now - current.ts).num_seconds() > self.cfg.stale_after.as_secs() as i64 {
            risk += self.cfg.stale_penalty;
            flags.push(SpoofFlag::StaleLocation);
        }

        if let Some(prev) = prev {
            let dt_secs = (current.ts - prev.ts).num_seconds().max(1) as f64;
            let distance_km = haversine_km((prev.lat, prev.lon), (current.lat, current.lon));
            let speed_kmh = distance_km / (dt_secs / 3600.0);

            if speed_kmh > self.cfg.speed_high_kmh {
                risk += self.cfg.speed_high_penalty;
                flags.push(SpoofFlag::SpeedHigh);
            } else if speed_kmh > self.cfg.speed_elevated_kmh {
                risk += self.cfg.speed_elevated_penalty;
                flags.push(SpoofFlag::SpeedElevated);
            }

            if distance_km < self.cfg.static_coords_km
                && dt_secs > self.cfg.static_coords_after.as_secs() as f64
            {
                risk += self.cfg.static_coords_penalty;
                flags.push(SpoofFlag::StaticCoords);
            }
        }

        let mut out = [None, None, None];
        for (slot, flag) in out.iter_mut().zip(flags.into_iter()) {
            *slot = Some(flag);
        }

        SpoofVerdict {
            risk: risk.clamp(0.0, 1.0),
            flags: out,
        }
    }

    /// Whether a driver whose last `demote_sample_count` evaluations all
    /// exceeded `demote_risk_threshold` should be demoted to Offline.
    pub fn should_demote(&self, recent_risks: &[f64]) -> bool {
        if recent_risks.len() < self.cfg.demote_sample_count {
            return false;
        }
        recent_risks
            .iter()
            .rev()
            .take(self.cfg.demote_sample_count)
            .all(|r| *r >= self.cfg.demote_risk_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample(lat: f64, lon: f64, ts: DateTime<Utc>) -> LocationSample {
        LocationSample {
            lat,
            lon,
            heading: None,
            accuracy_m: 5.0,
            ts,
        }
    }

    #[test]
    fn fresh_plausible_sample_has_zero_risk() {
        let det = SpoofDetector::new(SpoofConfig::default());
        let now = Utc::now();
        let prev = sample(52.40, -1.50, now - ChronoDuration::seconds(10));
        let curr = sample(52.401, -1.501, now);
        let verdict = det.evaluate(Some(&prev), &curr, now);
        assert_eq!(verdict.risk, 0.0);
        assert_eq!(verdict.flags().count(), 0);
    }

    #[test]
    fn stale_location_is_flagged() {
        let det = SpoofDetector::new(SpoofConfig::default());
        let now = Utc::now();
        let curr = sample(52.40, -1.50, now - ChronoDuration::seconds(30));
        let verdict = det.evaluate(None, &curr, now);
        assert!(verdict.risk > 0.0);
        assert!(verdict.flags().any(|f| f == SpoofFlag::StaleLocation));
    }

    #[test]
    fn implausible_speed_is_flagged_high() {
        let det = SpoofDetector::new(SpoofConfig::default());
        let now = Utc::now();
        // ~100km apart in 60 seconds => 6000 km/h, well above the high threshold.
        let prev = sample(52.0, -1.0, now - ChronoDuration::seconds(60));
        let curr = sample(53.0, -1.0, now);
        let verdict = det.evaluate(Some(&prev), &curr, now);
        assert!(verdict.flags().any(|f| f == SpoofFlag::SpeedHigh));
        assert!(verdict.risk >= 0.55);
    }

    #[test]
    fn static_coords_over_a_minute_is_flagged() {
        let det = SpoofDetector::new(SpoofConfig::default());
        let now = Utc::now();
        let prev = sample(52.40, -1.50, now - ChronoDuration::seconds(90));
        let curr = sample(52.40, -1.50, now);
        let verdict = det.evaluate(Some(&prev), &curr, now);
        assert!(verdict.flags().any(|f| f == SpoofFlag::StaticCoords));
    }

    #[test]
    fn demotion_requires_sustained_high_risk() {
        let det = SpoofDetector::new(SpoofConfig::default());
        assert!(!det.should_demote(&[0.9, 0.9]));
        assert!(det.should_demote(&[0.5, 0.9, 0.9, 0.9]));
        assert!(!det.should_demote(&[0.9, 0.9, 0.1]));
    }
}

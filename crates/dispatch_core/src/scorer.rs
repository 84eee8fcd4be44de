//! Utility scoring for a (driver, job) pairing.
//!
//! A weighted sum over geometry, fairness, reliability, ETA, heading, GPS
//! quality, and spoof risk, each clamped to `[0, 1]` before weighting.

use chrono::{DateTime, Utc};

use crate::config::ScorerWeights;
use crate::eta::EtaModel;
use crate::geo::angular_diff_deg;
use crate::model::DriverStats;

/// All inputs `Scorer::utility` needs for a single (driver, job) pairing.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub distance_km: f64,
    pub completed_jobs: u32,
    pub stats: &'a DriverStats,
    pub gps_accuracy_m: f64,
    /// `None` if the driver's heading is unknown.
    pub heading_deg: Option<f64>,
    /// `None` if the pickup bearing is unknown.
    pub pickup_bearing_deg: Option<f64>,
    pub last_job_completed_at: Option<DateTime<Utc>>,
    pub spoof_risk: f64,
    pub now: DateTime<Utc>,
    pub zone_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    pub(crate) weights: ScorerWeights,
}

impl Scorer {
    pub fn new(weights: ScorerWeights) -> Self {
        Self { weights }
    }

    pub(crate) fn dist_score(distance_km: f64) -> f64 {
        (1.0 - (distance_km / 10.0).min(1.0)).clamp(0.0, 1.0)
    }

    pub(crate) fn fairness_score(completed_jobs: u32) -> f64 {
        (1.0 - (completed_jobs as f64 / 200.0).min(1.0)).clamp(0.0, 1.0)
    }

    pub(crate) fn idle_bonus(last_job_completed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        match last_job_completed_at {
            None => 0.0,
            Some(last) => {
                let idle_minutes = (now - last).num_minutes().max(0) as f64;
                (idle_minutes / 60.0).min(1.0).clamp(0.0, 1.0)
            }
        }
    }

    pub(crate) fn eta_score(eta_min: f64) -> f64 {
        (1.0 - (eta_min / 30.0).min(1.0)).clamp(0.0, 1.0)
    }

    pub(crate) fn heading_bonus(
        heading_deg: Option<f64>,
        pickup_bearing_deg: Option<f64>,
        weights: &ScorerWeights,
    ) -> f64 {
        match (heading_deg, pickup_bearing_deg) {
            (Some(h), Some(b)) => {
                let delta = angular_diff_deg(h, b);
                if delta < weights.heading_close_deg {
                    weights.heading_bonus_close
                } else if delta < weights.heading_far_deg {
                    weights.heading_bonus_far
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    pub(crate) fn gps_penalty(gps_accuracy_m: f64) -> f64 {
        if gps_accuracy_m > 100.0 {
            0.95
        } else if gps_accuracy_m > 50.0 {
            0.98
        } else {
            1.0
        }
    }

    pub(crate) fn spoof_penalty(spoof_risk: f64, scale: f64) -> f64 {
        (1.0 - scale * spoof_risk.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }

    /// The scalar utility in `[0, 1]` for this (driver, job) pairing.
    pub fn utility(&self, eta_model: &dyn EtaModel, input: &ScoringInput<'_>) -> f64 {
        let w = &self.weights;
        let dist = Self::dist_score(input.distance_km);
        let fairness = Self::fairness_score(input.completed_jobs);
        let idle = Self::idle_bonus(input.last_job_completed_at, input.now);
        let reliability = input.stats.reliability_score();
        let eta_min = eta_model.predict(input.distance_km, input.now, input.zone_id);
        let eta = Self::eta_score(eta_min);
        let heading = Self::heading_bonus(input.heading_deg, input.pickup_bearing_deg, w);

        let weighted = w.distance * dist
            + w.fairness * fairness
            + w.idle * idle
            + w.reliability * reliability
            + w.eta * eta
            + heading;

        let gps_penalty = Self::gps_penalty(input.gps_accuracy_m);
        let spoof_penalty = Self::spoof_penalty(input.spoof_risk, w.spoof_penalty_scale);

        (weighted.clamp(0.0, 1.0) * gps_penalty * spoof_penalty).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eta::DefaultEtaModel;

    fn baseline_input(stats: &DriverStats) -> ScoringInput<'_> {
        ScoringInput {
            distance_km: 2.0,
            completed_jobs: 10,
            stats,
            gps_accuracy_m: 10.0,
            heading_deg: None,
            pickup_bearing_deg: None,
            last_job_completed_at: None,
            spoof_risk: 0.0,
            now: Utc::now(),
            zone_id: None,
        }
    }

    #[test]
    fn closer_driver_scores_higher() {
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let stats = DriverStats::default();
        let mut near = baseline_input(&stats);
        near.distance_km = 1.0;
        let mut far = baseline_input(&stats);
        far.distance_km = 8.0;

        assert!(scorer.utility(&eta_model, &near) > scorer.utility(&eta_model, &far));
    }

    #[test]
    fn higher_spoof_risk_never_increases_score() {
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let stats = DriverStats::default();
        let mut clean = baseline_input(&stats);
        clean.spoof_risk = 0.0;
        let mut risky = baseline_input(&stats);
        risky.spoof_risk = 0.9;

        assert!(scorer.utility(&eta_model, &clean) >= scorer.utility(&eta_model, &risky));
    }

    #[test]
    fn higher_reliability_never_decreases_score() {
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let reliable = DriverStats::default();
        let unreliable = DriverStats {
            completed_jobs: 5,
            cancelled_jobs: 20,
            no_show_cancels: 10,
            accept_rate: 0.2,
            avg_rating: 2.0,
        };
        let a = baseline_input(&reliable);
        let b = baseline_input(&unreliable);

        assert!(scorer.utility(&eta_model, &a) >= scorer.utility(&eta_model, &b));
    }

    #[test]
    fn idle_bonus_never_decreases_score() {
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let stats = DriverStats::default();
        let now = Utc::now();
        let mut fresh = baseline_input(&stats);
        fresh.now = now;
        fresh.last_job_completed_at = Some(now);
        let mut idle = baseline_input(&stats);
        idle.now = now;
        idle.last_job_completed_at = Some(now - chrono::Duration::minutes(45));

        assert!(scorer.utility(&eta_model, &idle) >= scorer.utility(&eta_model, &fresh));
    }

    #[test]
    fn score_is_always_within_unit_interval() {
        let scorer = Scorer::new(ScorerWeights::default());
        let eta_model = DefaultEtaModel::default();
        let stats = DriverStats::default();
        let mut extreme = baseline_input(&stats);
        extreme.distance_km = 0.0;
        extreme.completed_jobs = 0;
        extreme.spoof_risk = 0.0;
        let s = scorer.utility(&eta_model, &extreme);
        assert!((0.0..=1.0).contains(&s));
    }
}

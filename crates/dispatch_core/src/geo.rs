//! Great-circle distance, bearing, UK bounding-box validation, and a
//! pluggable geocoding adapter.
//!
//! Distance and bearing operate directly on raw `(lat, lon)` pairs rather
//! than a hex-grid index, since that's all the dispatch engine ever has
//! on hand.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{GeocodeConfig, UK_BBOX_LAT, UK_BBOX_LON};
use crate::error::{DispatchError, DispatchResult};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two `(lat, lon)` points in
/// decimal degrees.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial compass bearing in degrees `[0, 360)` from `from` to `to`.
pub fn bearing_deg(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlon = lon2 - lon1;
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Absolute angular difference between two bearings, wrapped to `[0, 180]`.
pub fn angular_diff_deg(a: f64, b: f64) -> f64 {
    let raw = (a - b).abs() % 360.0;
    if raw > 180.0 {
        360.0 - raw
    } else {
        raw
    }
}

/// A coordinate is valid iff it is non-zero, finite, and within the UK
/// bounding box used for this deployment.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    if !lat.is_finite() || !lon.is_finite() {
        return false;
    }
    if lat == 0.0 && lon == 0.0 {
        return false;
    }
    lat >= UK_BBOX_LAT.0 && lat <= UK_BBOX_LAT.1 && lon >= UK_BBOX_LON.0 && lon <= UK_BBOX_LON.1
}

/// A regional hint used to steer geocoding (e.g. inferred from a phone
/// country code). Opaque beyond being passed through to the adapter.
#[derive(Debug, Clone, Default)]
pub struct RegionHint(pub Option<String>);

/// Calling codes this deployment recognises, longest prefix first match.
const CALLING_CODES: &[(&str, &str)] = &[("353", "IE"), ("44", "GB"), ("33", "FR"), ("49", "DE"), ("1", "US")];

impl RegionHint {
    /// Infers a hint from a phone number's international dialling prefix
    /// (`+44...` or `0044...`). Returns an empty hint for numbers with no
    /// recognised prefix, including plain national-format numbers.
    pub fn from_phone(phone: &str) -> Self {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();
        let Some(cc) = digits.strip_prefix('+').or_else(|| digits.strip_prefix("00")) else {
            return Self::default();
        };
        CALLING_CODES
            .iter()
            .find(|(code, _)| cc.starts_with(code))
            .map(|(_, region)| Self(Some(region.to_string())))
            .unwrap_or_default()
    }
}

/// Resolves free-form address text into coordinates. Implementations are
/// expected to respect the caller's deadline themselves where possible;
/// [`Geocoder::resolve_with_deadline`] always enforces it regardless.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, text: &str, hint: &RegionHint) -> DispatchResult<(f64, f64)>;
}

/// Wraps any [`Geocoder`] with a hard deadline ("deadline of
/// 5s" requirement.
pub async fn resolve_with_deadline(
    geocoder: &dyn Geocoder,
    text: &str,
    hint: &RegionHint,
    deadline: Duration,
) -> DispatchResult<(f64, f64)> {
    match tokio::time::timeout(deadline, geocoder.resolve(text, hint)).await {
        Ok(inner) => inner,
        Err(_) => Err(DispatchError::GeocodeTimeout(deadline)),
    }
}

/// A geocoder that always fails; used when no real address-resolution
/// service is configured. Callers fall back to [`GeocodeConfig`]'s
/// configured default coordinates (`coords_fixed = true`).
#[derive(Debug, Default)]
pub struct NullGeocoder;

#[async_trait]
impl Geocoder for NullGeocoder {
    async fn resolve(&self, _text: &str, _hint: &RegionHint) -> DispatchResult<(f64, f64)> {
        Err(DispatchError::Geocode(
            "no geocoding backend configured".to_string(),
        ))
    }
}

/// Resolve a pickup/dropoff pair, falling back to the configured default
/// city-centre coordinates on failure. Returns `(pickup, dropoff,
/// coords_fixed)`.
pub async fn repair_coordinates(
    geocoder: &dyn Geocoder,
    pickup_text: &str,
    dropoff_text: &str,
    pickup: (f64, f64),
    dropoff: (f64, f64),
    hint: &RegionHint,
    cfg: &GeocodeConfig,
) -> ((f64, f64), (f64, f64), bool) {
    let mut fixed = false;
    let pickup = if is_valid_coordinate(pickup.0, pickup.1) {
        pickup
    } else {
        fixed = true;
        resolve_with_deadline(geocoder, pickup_text, hint, cfg.deadline)
            .await
            .unwrap_or((cfg.fallback_lat, cfg.fallback_lon))
    };
    let dropoff = if is_valid_coordinate(dropoff.0, dropoff.1) {
        dropoff
    } else {
        fixed = true;
        resolve_with_deadline(geocoder, dropoff_text, hint, cfg.deadline)
            .await
            .unwrap_or((cfg.fallback_lat, cfg.fallback_lon))
    };
    (pickup, dropoff, fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        let d = haversine_km((52.4068, -1.5197), (52.4068, -1.5197));
        assert!(d < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance_approximately() {
        // Coventry to Birmingham, roughly 29km apart.
        let d = haversine_km((52.4068, -1.5197), (52.4862, -1.8904));
        assert!((d - 29.0).abs() < 5.0, "distance was {d}");
    }

    #[test]
    fn bearing_north_is_zero() {
        let b = bearing_deg((52.0, -1.0), (53.0, -1.0));
        assert!(b.abs() < 1.0 || (b - 360.0).abs() < 1.0);
    }

    #[test]
    fn angular_diff_wraps_correctly() {
        assert!((angular_diff_deg(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((angular_diff_deg(0.0, 180.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn zero_zero_is_invalid() {
        assert!(!is_valid_coordinate(0.0, 0.0));
    }

    #[test]
    fn outside_uk_bbox_is_invalid() {
        assert!(!is_valid_coordinate(40.7128, -74.0060)); // New York
    }

    #[test]
    fn coventry_is_valid() {
        assert!(is_valid_coordinate(52.4068, -1.5197));
    }

    #[test]
    fn region_hint_from_phone_recognises_uk_prefix() {
        assert_eq!(RegionHint::from_phone("+447911123456").0.as_deref(), Some("GB"));
        assert_eq!(RegionHint::from_phone("00447911123456").0.as_deref(), Some("GB"));
    }

    #[test]
    fn region_hint_from_phone_is_empty_for_unrecognised_or_national_numbers() {
        assert!(RegionHint::from_phone("07911123456").0.is_none());
        assert!(RegionHint::from_phone("+998712345678").0.is_none());
    }

    #[tokio::test]
    async fn repair_falls_back_on_geocode_failure() {
        let cfg = GeocodeConfig::default();
        let (pickup, _dropoff, fixed) = repair_coordinates(
            &NullGeocoder,
            "Coventry Railway Station",
            "Birmingham New Street",
            (0.0, 0.0),
            (52.4791, -1.8990),
            &RegionHint::default(),
            &cfg,
        )
        .await;
        assert!(fixed);
        assert_eq!(pickup, (cfg.fallback_lat, cfg.fallback_lon));
    }
}

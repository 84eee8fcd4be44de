//! Normalizes heterogeneous ride-request payloads into a single
//! [`JobRequest`], following the canonical/legacy field alias table.
//!
//! "Dynamic payload polymorphism (two wire formats, optional fields,
//! coordinate aliases) maps to a tagged-union `JobRequest` with an
//! explicit normalization pass".

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{MAX_BIDDING_WINDOW_SECS, MIN_BIDDING_WINDOW_SECS};
use crate::error::{DispatchError, DispatchResult};
use crate::model::VehicleClass;

/// A fully normalized ride request, ready for coordinate validation and
/// admission. All formats JobIngestor accepts converge here.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub pickup_text: String,
    pub dropoff_text: String,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub dropoff_lat: f64,
    pub dropoff_lon: f64,
    pub passengers: u32,
    pub passenger_detail: Option<String>,
    pub vehicle_override: Option<VehicleClass>,
    pub priority: Option<String>,
    pub payment_method: Option<String>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub fare_estimate: Option<Decimal>,
    pub bidding_window_seconds: u64,
}

/// Raw submission before normalization: loosely-typed JSON plus which
/// channel it arrived on, since each channel has its own field quirks.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubmission {
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

fn str_field<'a>(fields: &'a HashMap<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| fields.get(*k).and_then(Value::as_str))
}

fn num_field(fields: &HashMap<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = fields.get(*k)?;
        if let Some(n) = v.as_f64() {
            return Some(n);
        }
        v.as_str().and_then(parse_locale_invariant_decimal)
    })
}

/// Parses a decimal string, stripping common currency symbols and
/// thousands separators, locale-invariantly (`.` is always the decimal
/// point).
fn parse_locale_invariant_decimal(raw: &str) -> Option<f64> {
    let stripped: String = raw.chars().filter(|c| !matches!(c, '£' | '€' | '$' | ',' | ' ')).collect();
    stripped.trim().parse::<f64>().ok()
}

/// Parses a passenger field that may be an int or a string like
/// `"4 (2 adults, 2 kids)"`: the leading integer is the count, the whole
/// string is preserved as `passenger_detail`.
fn parse_passengers(fields: &HashMap<String, Value>) -> (u32, Option<String>) {
    match fields.get("passengers") {
        Some(Value::Number(n)) => (n.as_u64().unwrap_or(1) as u32, None),
        Some(Value::String(s)) => {
            let leading: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            let count = leading.parse::<u32>().unwrap_or(1).max(1);
            (count, Some(s.clone()))
        }
        _ => (1, None),
    }
}

fn parse_bidding_window(fields: &HashMap<String, Value>) -> u64 {
    let raw = num_field(fields, &["biddingWindowSec", "bidding_window_seconds"]);
    let secs = raw.map(|v| v.round() as i64).unwrap_or(30);
    secs.clamp(MIN_BIDDING_WINDOW_SECS as i64, MAX_BIDDING_WINDOW_SECS as i64) as u64
}

/// Parses `temp1..temp3` expansion fields (`"key:value"`) into
/// `priority`/`vehicle_override`/`payment_method`.
fn parse_expansion_fields(fields: &HashMap<String, Value>) -> (Option<String>, Option<VehicleClass>, Option<String>) {
    let mut priority = None;
    let mut vehicle_override = None;
    let mut payment_method = None;

    for key in ["temp1", "temp2", "temp3"] {
        let Some(raw) = fields.get(key).and_then(Value::as_str) else {
            continue;
        };
        let Some((tag, value)) = raw.split_once(':') else {
            continue;
        };
        match tag.trim() {
            "priority" => priority = Some(value.trim().to_string()),
            "vehicle_override" => vehicle_override = parse_vehicle_class(value.trim()),
            "payment_method" => payment_method = Some(value.trim().to_string()),
            _ => {}
        }
    }
    (priority, vehicle_override, payment_method)
}

fn parse_vehicle_class(raw: &str) -> Option<VehicleClass> {
    match raw.to_ascii_lowercase().as_str() {
        "saloon" => Some(VehicleClass::Saloon),
        "estate" => Some(VehicleClass::Estate),
        "mpv" => Some(VehicleClass::Mpv),
        "minibus" => Some(VehicleClass::Minibus),
        _ => None,
    }
}

pub fn normalize(raw: &RawSubmission) -> DispatchResult<JobRequest> {
    let fields = &raw.fields;

    let pickup_text = str_field(fields, &["pickupAddress", "pickup", "pubName"])
        .ok_or_else(|| DispatchError::Admission("missing pickup address".to_string()))?
        .to_string();
    let dropoff_text = str_field(fields, &["dropoff", "dropoffName"]).unwrap_or_default().to_string();

    let pickup_lat = num_field(fields, &["lat", "pickupLat"]).unwrap_or(0.0);
    let pickup_lon = num_field(fields, &["lng", "pickupLng"]).unwrap_or(0.0);
    let dropoff_lat = num_field(fields, &["dropoffLat"]).unwrap_or(0.0);
    let dropoff_lon = num_field(fields, &["dropoffLng"]).unwrap_or(0.0);

    let (passengers, passenger_detail) = parse_passengers(fields);
    let (priority, vehicle_override, payment_method) = parse_expansion_fields(fields);

    let caller_name = str_field(fields, &["customerName", "callerName"]).map(str::to_string);
    let caller_phone = str_field(fields, &["customerPhone", "callerPhone"]).map(str::to_string);
    let fare_estimate = str_field(fields, &["fare", "estimatedFare"])
        .and_then(parse_locale_invariant_decimal)
        .and_then(|amount| Decimal::try_from(amount).ok());

    Ok(JobRequest {
        pickup_text,
        dropoff_text,
        pickup_lat,
        pickup_lon,
        dropoff_lat,
        dropoff_lon,
        passengers,
        passenger_detail,
        vehicle_override,
        priority,
        payment_method,
        caller_name,
        caller_phone,
        fare_estimate,
        bidding_window_seconds: parse_bidding_window(fields),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(fields: serde_json::Value) -> RawSubmission {
        serde_json::from_value(fields).unwrap()
    }

    #[test]
    fn accepts_legacy_field_aliases() {
        let raw = submission(json!({
            "pubName": "Coventry Railway Station",
            "dropoffName": "Birmingham Airport",
            "pickupLat": 52.4006,
            "pickupLng": -1.5137,
        }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.pickup_text, "Coventry Railway Station");
        assert_eq!(req.dropoff_text, "Birmingham Airport");
        assert_eq!(req.pickup_lat, 52.4006);
    }

    #[test]
    fn strips_currency_symbols_from_fare() {
        let raw = submission(json!({
            "pickupAddress": "A",
            "fare": "£12.50",
        }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.fare_estimate, Some(Decimal::try_from(12.50).unwrap()));
    }

    #[test]
    fn passenger_string_keeps_leading_integer_and_full_detail() {
        let raw = submission(json!({
            "pickupAddress": "A",
            "passengers": "4 (2 adults, 2 kids)",
        }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.passengers, 4);
        assert_eq!(req.passenger_detail.as_deref(), Some("4 (2 adults, 2 kids)"));
    }

    #[test]
    fn bidding_window_is_clamped_to_bounds() {
        let raw = submission(json!({
            "pickupAddress": "A",
            "biddingWindowSec": 500,
        }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.bidding_window_seconds, MAX_BIDDING_WINDOW_SECS);
    }

    #[test]
    fn missing_bidding_window_defaults_to_thirty() {
        let raw = submission(json!({ "pickupAddress": "A" }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.bidding_window_seconds, 30);
    }

    #[test]
    fn expansion_fields_populate_priority_and_vehicle_override() {
        let raw = submission(json!({
            "pickupAddress": "A",
            "temp1": "priority:urgent",
            "temp2": "vehicle_override:minibus",
            "temp3": "payment_method:card",
        }));
        let req = normalize(&raw).unwrap();
        assert_eq!(req.priority.as_deref(), Some("urgent"));
        assert_eq!(req.vehicle_override, Some(VehicleClass::Minibus));
        assert_eq!(req.payment_method.as_deref(), Some("card"));
    }

    #[test]
    fn missing_pickup_address_is_rejected() {
        let raw = submission(json!({ "lat": 52.4 }));
        let err = normalize(&raw).unwrap_err();
        assert!(matches!(err, DispatchError::Admission(_)));
    }
}

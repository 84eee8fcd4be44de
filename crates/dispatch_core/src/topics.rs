//! Bus topic name helpers for the subscribe/publish table.

pub fn driver_location(driver_id: &str) -> String {
    format!("drivers/{driver_id}/location")
}

pub fn driver_status(driver_id: &str) -> String {
    format!("drivers/{driver_id}/status")
}

pub const TAXI_BOOKINGS: &str = "taxi/bookings";

pub fn pubs_request(job_id: &str) -> String {
    format!("pubs/requests/{job_id}")
}

pub fn job_bid(job_id: &str) -> String {
    format!("jobs/{job_id}/bid")
}

pub fn job_response(job_id: &str) -> String {
    format!("jobs/{job_id}/response")
}

pub fn driver_bid_request(driver_id: &str) -> String {
    format!("drivers/{driver_id}/bid-request")
}

pub fn driver_jobs(driver_id: &str) -> String {
    format!("drivers/{driver_id}/jobs")
}

pub fn job_allocated(job_id: &str) -> String {
    format!("jobs/{job_id}/allocated")
}

pub fn job_status(job_id: &str) -> String {
    format!("jobs/{job_id}/status")
}

pub fn job_result(job_id: &str, driver_id: &str) -> String {
    format!("jobs/{job_id}/result/{driver_id}")
}

/// Subscribe-side wildcard subjects, matching any concrete id in the
/// placeholder position. `*` is a NATS single-token wildcard; both
/// [`crate::bus::NatsBus`] and [`crate::bus::InMemoryBus`] understand it.
pub const DRIVER_LOCATION_WILDCARD: &str = "drivers/*/location";
pub const DRIVER_STATUS_WILDCARD: &str = "drivers/*/status";
pub const JOB_BID_WILDCARD: &str = "jobs/*/bid";
pub const JOB_RESPONSE_WILDCARD: &str = "jobs/*/response";

/// Wildcard subject for direct job submissions on `{prefix}/*`, e.g.
/// `pubs/requests/*` for the default configured prefix.
pub fn job_submission_wildcard(prefix: &str) -> String {
    format!("{prefix}/*")
}

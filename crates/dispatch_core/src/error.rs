//! Crate-wide error kinds, matching the failure taxonomy in the dispatch
//! engine's error handling design: admission, store, bus, geocoding, and
//! matcher exceptions each surface as a distinct variant so callers can
//! match on them instead of string-inspecting errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {0} already exists")]
    DuplicateId(String),

    #[error("job {job_id} is not in status {expected:?} (actual: {actual:?})")]
    IllegalTransition {
        job_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("duplicate bid for job {job_id} from driver {driver_id}")]
    DuplicateBid { job_id: String, driver_id: String },

    #[error("auction for job {0} is not open")]
    AuctionNotOpen(String),

    #[error("unknown driver {0}")]
    UnknownDriver(String),

    #[error("unknown job {0}")]
    UnknownJob(String),

    #[error("submission rejected: pickup/dropoff coordinates are invalid and could not be geocoded")]
    InvalidCoordinates,

    #[error("submission rejected: {0}")]
    Admission(String),

    #[error("geocoding timed out after {0:?}")]
    GeocodeTimeout(std::time::Duration),

    #[error("geocoding failed: {0}")]
    Geocode(String),

    #[error("bus publish failed after retries on {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("bus subscribe failed on {topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store unreachable: {0}")]
    StoreUnavailable(String),

    #[error("intake queue is saturated")]
    Busy,

    #[error("matcher failed, pool returned to pending: {0}")]
    MatcherFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

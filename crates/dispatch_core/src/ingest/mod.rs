//! Ride-request normalization and the intake tasks: [`job_ingestor`]
//! (ride requests), [`location_ingestor`] (driver GPS/status), and
//! [`bus_ingress`] (routes both, plus driver bids, in off the message
//! bus).

pub mod bus_ingress;
pub mod job_ingestor;
pub mod location_ingestor;
pub mod normalize;

pub use bus_ingress::BusIngressDeps;
pub use job_ingestor::{IntakeHandle, Submission};
pub use location_ingestor::DriverEvent;
pub use normalize::{normalize, JobRequest, RawSubmission};

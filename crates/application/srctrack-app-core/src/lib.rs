//! Entry point for callers: a registry of trackers and a facade that answers
//! status and conflict questions and records finished operations.

mod error;
mod facade;
mod registry;

pub use error::TrackingError;
pub use facade::{RemoteUpdateReport, SourceTracking, TrackingSetup, TrackingStatus};
pub use registry::TrackerRegistry;

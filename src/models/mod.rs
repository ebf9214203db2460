mod tracker;
mod visit;

pub use tracker::{DeleteTrackerRequest, SecretBody, Tracker, TrackerSummary};
pub use visit::{NewVisit, RefererCount, VisitRow};

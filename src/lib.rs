pub mod alert;
pub mod clock;
pub mod config;
pub mod detection;
pub mod feed;
pub mod geometry;
pub mod throttle;
pub mod tracker;
pub mod tracking;

pub use alert::{AlertCandidate, FilteredAlert, SuppressionReason};
pub use config::{Config, ConfigError, TrackerSettings};
pub use detection::Detection;
pub use geometry::BoundingBox;
pub use tracker::{CameraSnapshot, FrameOutcome, Tracker};

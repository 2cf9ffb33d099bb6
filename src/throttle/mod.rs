mod camera;
mod damping;
mod filter;
mod global;

pub use camera::CameraAlertHistory;
pub use damping::{should_damp, FixedRandom, RandomSource, SeededRandom};
pub use filter::{dynamic_interval, resolve_person, AlertThrottle, ACTIVITY_THRESHOLD};
pub use global::{GlobalEntry, GlobalSuppression, GlobalSuppressionTable};

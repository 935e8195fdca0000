mod detection;
mod engine;
mod kalman_filter;
mod matching;
mod metadata;
mod rect;
mod track;
mod track_state;

pub use detection::{Detection, DetectionBuilder, TrackedDetection};
pub use engine::{EngineConfig, Parameter, TrackerEngine};
pub use kalman_filter::KalmanFilter;
pub use metadata::{DEFAULT_METADATA_DENYLIST, Metadata, MetadataKind};
pub use rect::Rect;
pub use track::Track;
pub use track_state::TrackState;

//! Multi-stream multi-object tracking for video analytics pipelines.
//!
//! The crate keeps detector and tracker decoupled: a pipeline runs its own
//! detection stage, converts each frame's boxes into [`Detection`] values
//! (the [`DetectionBuilder`] helps with format conversion), and feeds them
//! to a [`TrackingRegistry`] that owns one tracking engine per named
//! stream. Each engine runs a ByteTrack-style association cascade over a
//! Kalman-predicted track pool and hands back [`TrackedDetection`] values
//! carrying stable track identities, lifecycle states, and any metadata
//! attached to the tracks between frames.
//!
//! Typical flow per stream: `create` an engine once, call `update` with
//! every frame's detections (including empty frames, which age tracks
//! out), and use `attach_metadata` to carry downstream results such as
//! classifications across frames on the track they belong to.

pub mod registry;
pub mod tracker;

pub use registry::{TrackerError, TrackingRegistry};
pub use tracker::{
    Detection, DetectionBuilder, EngineConfig, Metadata, MetadataKind, Parameter, Rect,
    TrackState, TrackedDetection, TrackerEngine,
};

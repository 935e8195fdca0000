//! Registry of per-stream tracking engines.
//!
//! This module provides the [`TrackingRegistry`], the shared entry point a
//! pipeline uses to run tracking for many video streams at once: create an
//! engine per stream, feed each frame's detections through `update`, and
//! manage track metadata between frames.

mod error;
mod tracking_registry;

pub use error::TrackerError;
pub use tracking_registry::TrackingRegistry;

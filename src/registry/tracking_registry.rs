//! Shared registry mapping stream names to tracking engines.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::registry::error::TrackerError;
use crate::tracker::{
    Detection, EngineConfig, Metadata, MetadataKind, Parameter, TrackedDetection, TrackerEngine,
};

/// Owns one [`TrackerEngine`] per named stream behind a single lock.
///
/// Every operation addresses a stream by name and holds the lock only for
/// its duration, so concurrent updates to different streams serialize but
/// never interleave within one engine's cascade.
#[derive(Debug, Default)]
pub struct TrackingRegistry {
    engines: Mutex<HashMap<String, TrackerEngine>>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_engine<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut TrackerEngine) -> T,
    ) -> Result<T, TrackerError> {
        let mut engines = self.engines.lock();
        match engines.get_mut(name) {
            Some(engine) => Ok(f(engine)),
            None => Err(TrackerError::UnknownStream {
                name: name.to_string(),
            }),
        }
    }

    /// Create an engine for a stream. Creating over an existing name
    /// replaces the engine, discarding all of its tracks.
    pub fn create(&self, name: impl Into<String>, config: EngineConfig) {
        let name = name.into();
        let mut engines = self.engines.lock();
        match engines.insert(name.clone(), TrackerEngine::new(config)) {
            Some(_) => tracing::debug!("replaced tracking engine for stream {}", name),
            None => tracing::debug!("created tracking engine for stream {}", name),
        }
    }

    /// Create an engine with default configuration.
    pub fn create_default(&self, name: impl Into<String>) {
        self.create(name, EngineConfig::default());
    }

    /// Remove a stream's engine, discarding all of its tracks.
    pub fn remove(&self, name: &str) -> Result<(), TrackerError> {
        let mut engines = self.engines.lock();
        match engines.remove(name) {
            Some(_) => {
                tracing::debug!("removed tracking engine for stream {}", name);
                Ok(())
            }
            None => Err(TrackerError::UnknownStream {
                name: name.to_string(),
            }),
        }
    }

    /// Run one tracking cycle for a stream over a frame's detections.
    pub fn update(
        &self,
        name: &str,
        detections: Vec<Detection>,
    ) -> Result<Vec<TrackedDetection>, TrackerError> {
        self.with_engine(name, |engine| engine.update(detections))
    }

    /// Attach metadata to a live track of a stream. Returns whether it was
    /// attached; a stale track identity or a denylisted kind is refused.
    pub fn attach_metadata(
        &self,
        name: &str,
        track_id: u64,
        metadata: Metadata,
    ) -> Result<bool, TrackerError> {
        self.with_engine(name, |engine| engine.attach_metadata(track_id, metadata))
    }

    /// Remove all metadata of a kind from a live track of a stream.
    pub fn remove_metadata(
        &self,
        name: &str,
        track_id: u64,
        kind: MetadataKind,
    ) -> Result<(), TrackerError> {
        self.with_engine(name, |engine| engine.remove_metadata(track_id, kind))
    }

    /// Remove classifications with the given classifier tag from a live
    /// track of a stream.
    pub fn remove_classifications(
        &self,
        name: &str,
        track_id: u64,
        classifier: &str,
    ) -> Result<(), TrackerError> {
        self.with_engine(name, |engine| {
            engine.remove_classifications(track_id, classifier)
        })
    }

    /// Adjust one engine parameter at runtime.
    pub fn set_parameter(&self, name: &str, parameter: Parameter) -> Result<(), TrackerError> {
        self.with_engine(name, |engine| engine.apply_parameter(parameter))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }
}

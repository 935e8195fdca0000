//! Auxiliary results attached to tracks by downstream pipeline stages.

/// A single metadata value carried by a track.
///
/// Downstream stages attach these through the registry by (stream name,
/// identity) rather than to a single frame's detection, so a verdict made
/// once follows the object while it stays tracked.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// A classifier verdict.
    Classification {
        /// Which classifier produced the verdict, e.g. "color" or "gender".
        classifier: String,
        label: String,
        confidence: f32,
    },
    /// A feature embedding, typically from a re-identification network.
    Embedding {
        data: Vec<f32>,
        width: u32,
        height: u32,
    },
    /// Keypoints in box-relative coordinates.
    Landmarks {
        label: String,
        points: Vec<(f32, f32)>,
    },
    /// Per-pixel depth estimate for the box region.
    DepthMask {
        data: Vec<f32>,
        width: u32,
        height: u32,
    },
    /// Per-pixel class indices for the box region.
    ClassMask {
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// Opaque caller-defined payload.
    UserPayload { label: String, bytes: Vec<u8> },
}

impl Metadata {
    pub fn kind(&self) -> MetadataKind {
        match self {
            Metadata::Classification { .. } => MetadataKind::Classification,
            Metadata::Embedding { .. } => MetadataKind::Embedding,
            Metadata::Landmarks { .. } => MetadataKind::Landmarks,
            Metadata::DepthMask { .. } => MetadataKind::DepthMask,
            Metadata::ClassMask { .. } => MetadataKind::ClassMask,
            Metadata::UserPayload { .. } => MetadataKind::UserPayload,
        }
    }
}

/// Discriminant of `Metadata`, used in denylists and removal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Classification,
    Embedding,
    Landmarks,
    DepthMask,
    ClassMask,
    UserPayload,
}

/// Kinds refused on attach and purged at merge time unless reconfigured.
/// Box-relative geometry is not carried across frames by default.
pub const DEFAULT_METADATA_DENYLIST: [MetadataKind; 3] = [
    MetadataKind::Landmarks,
    MetadataKind::DepthMask,
    MetadataKind::ClassMask,
];

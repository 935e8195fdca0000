//! Detector inputs and identity-tagged tracker outputs.

use crate::tracker::metadata::Metadata;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// A single-frame detector output handed to a tracking engine.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box in normalized [0, 1] image coordinates.
    pub bbox: Rect,
    /// Detector confidence.
    pub confidence: f32,
    /// Detector class index; -1 when the detector does not classify.
    pub class_id: i32,
    /// Optional class label.
    pub label: Option<String>,
}

impl Detection {
    pub fn new(bbox: Rect, confidence: f32) -> Self {
        Self {
            bbox,
            confidence,
            class_id: -1,
            label: None,
        }
    }

    /// A detection the association cascade can consume: finite fields and
    /// a box with positive extent.
    pub fn is_valid(&self) -> bool {
        self.bbox.x.is_finite()
            && self.bbox.y.is_finite()
            && self.bbox.width.is_finite()
            && self.bbox.height.is_finite()
            && self.confidence.is_finite()
            && self.bbox.width > 0.0
            && self.bbox.height > 0.0
    }
}

/// One reported track: the smoothed box plus the stable identity and the
/// attributes carried from its most recent matched detection.
#[derive(Debug, Clone)]
pub struct TrackedDetection {
    pub bbox: Rect,
    pub confidence: f32,
    pub class_id: i32,
    pub label: Option<String>,
    /// Identity assigned by the engine, stable for the track's lifetime.
    pub track_id: u64,
    pub state: TrackState,
    /// Snapshot of the track's metadata bag.
    pub metadata: Vec<Metadata>,
}

/// Builder for creating `Detection` objects from various input formats.
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    bbox: Rect,
    confidence: f32,
    class_id: i32,
    label: Option<String>,
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self {
            bbox: Rect::default(),
            confidence: 0.0,
            class_id: -1,
            label: None,
        }
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(cx - w / 2.0, cy - h / 2.0, w, h);
        self
    }

    /// Set bounding box in TLWH format (x, y, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(x, y, w, h);
        self
    }

    /// Set the confidence score.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the detector class index.
    pub fn class_id(mut self, class_id: i32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Set the class label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        Detection {
            bbox: self.bbox,
            confidence: self.confidence,
            class_id: self.class_id,
            label: self.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(0.10, 0.20, 0.50, 0.80)
            .confidence(0.95)
            .class_id(3)
            .label("person")
            .build();

        assert_eq!(det.confidence, 0.95);
        assert_eq!(det.class_id, 3);
        assert_eq!(det.label.as_deref(), Some("person"));
        assert!((det.bbox.width - 0.40).abs() < 1e-6);
        assert!((det.bbox.height - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_builder_box_formats_agree() {
        let a = DetectionBuilder::new().tlbr(0.1, 0.2, 0.3, 0.6).build();
        let b = DetectionBuilder::new().tlwh(0.1, 0.2, 0.2, 0.4).build();
        let c = DetectionBuilder::new().xywh(0.2, 0.4, 0.2, 0.4).build();

        for built in [&b, &c] {
            assert!((a.bbox.x - built.bbox.x).abs() < 1e-6);
            assert!((a.bbox.y - built.bbox.y).abs() < 1e-6);
            assert!((a.bbox.width - built.bbox.width).abs() < 1e-6);
            assert!((a.bbox.height - built.bbox.height).abs() < 1e-6);
        }
    }

    #[test]
    fn test_detection_validity() {
        let valid = Detection::new(Rect::new(0.1, 0.1, 0.2, 0.2), 0.9);
        assert!(valid.is_valid());

        let nan_box = Detection::new(Rect::new(f32::NAN, 0.1, 0.2, 0.2), 0.9);
        assert!(!nan_box.is_valid());

        let negative_extent = Detection::new(Rect::new(0.1, 0.1, -0.2, 0.2), 0.9);
        assert!(!negative_extent.is_valid());

        let zero_extent = DetectionBuilder::new().confidence(0.9).build();
        assert!(!zero_extent.is_valid());

        let bad_confidence = Detection::new(Rect::new(0.1, 0.1, 0.2, 0.2), f32::INFINITY);
        assert!(!bad_confidence.is_valid());
    }
}

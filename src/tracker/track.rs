//! A single tracked identity and its lifecycle bookkeeping.

use ndarray::{Array1, Array2};

use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::metadata::{Metadata, MetadataKind};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// One tracked object: motion state, lifecycle state, and the metadata bag
/// external stages write through the registry.
#[derive(Debug, Clone)]
pub struct Track {
    /// Identity unique within the owning engine, assigned at activation
    pub(crate) track_id: u64,
    /// Current lifecycle state
    pub(crate) state: TrackState,
    /// Confidence of the most recent matched detection
    pub(crate) confidence: f32,
    /// Class index of the most recent matched detection
    pub(crate) class_id: i32,
    /// Label of the most recent matched detection
    pub(crate) label: Option<String>,
    /// Frame of the most recent match
    pub(crate) frame_id: u32,
    /// Frame the track was activated in
    pub(crate) start_frame: u32,
    /// Consecutive-match streak
    pub(crate) tracklet_len: u32,
    /// Kalman filter state mean (8-dim)
    pub(crate) mean: Option<Array1<f64>>,
    /// Kalman filter state covariance (8x8)
    pub(crate) covariance: Option<Array2<f64>>,
    /// Raw detection bounding box (TLWH format)
    pub(crate) tlwh: Rect,
    /// Externally attached results, keyed by `MetadataKind`
    pub(crate) metadata: Vec<Metadata>,
}

impl Track {
    /// Create an unactivated track from a detection.
    pub(crate) fn new(detection: Detection) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            confidence: detection.confidence,
            class_id: detection.class_id,
            label: detection.label,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            mean: None,
            covariance: None,
            tlwh: detection.bbox,
            metadata: Vec::new(),
        }
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn start_frame(&self) -> u32 {
        self.start_frame
    }

    /// Frame of the most recent match.
    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// Current bounding box: derived from the motion state once activated,
    /// otherwise the raw detection box.
    pub fn rect(&self) -> Rect {
        match &self.mean {
            Some(mean) => Rect::from_xyah(
                mean[0] as f32,
                mean[1] as f32,
                mean[2] as f32,
                mean[3] as f32,
            ),
            None => self.tlwh,
        }
    }

    /// Motion state, absent until activation.
    pub(crate) fn motion(&self) -> Option<(&Array1<f64>, &Array2<f64>)> {
        self.mean.as_ref().zip(self.covariance.as_ref())
    }

    /// Start tracking: initiate the motion state and take the identity the
    /// engine allocated. `confirmed` short-circuits the New state for
    /// engines configured to report first sightings.
    pub(crate) fn activate(
        &mut self,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
        track_id: u64,
        confirmed: bool,
    ) {
        self.track_id = track_id;

        let (mean, covariance) = kalman_filter.initiate(self.tlwh.to_xyah_f64());
        self.mean = Some(mean);
        self.covariance = Some(covariance);
        self.tracklet_len = 0;
        self.state = if confirmed {
            TrackState::Tracked
        } else {
            TrackState::New
        };
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    /// Recover a lost track from a matched detection. `new_id` swaps the
    /// identity for engines configured not to preserve it across loss.
    pub(crate) fn re_activate(
        &mut self,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
        new_id: Option<u64>,
        keep_past_metadata: bool,
        denylist: &[MetadataKind],
    ) {
        if let (Some(mean), Some(cov)) = (&self.mean, &self.covariance) {
            let (new_mean, new_cov) = kalman_filter.update(mean, cov, detection.bbox.to_xyah_f64());
            self.mean = Some(new_mean);
            self.covariance = Some(new_cov);
        }

        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        self.frame_id = frame_id;
        if let Some(track_id) = new_id {
            self.track_id = track_id;
        }
        self.adopt(detection);
        self.merge_metadata(keep_past_metadata, denylist);
    }

    /// Refresh a matched track from its associated detection.
    pub(crate) fn update(
        &mut self,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
        keep_past_metadata: bool,
        denylist: &[MetadataKind],
    ) {
        self.frame_id = frame_id;
        self.tracklet_len += 1;

        if let (Some(mean), Some(cov)) = (&self.mean, &self.covariance) {
            let (new_mean, new_cov) = kalman_filter.update(mean, cov, detection.bbox.to_xyah_f64());
            self.mean = Some(new_mean);
            self.covariance = Some(new_cov);
        }

        self.state = TrackState::Tracked;
        self.adopt(detection);
        self.merge_metadata(keep_past_metadata, denylist);
    }

    fn adopt(&mut self, detection: &Detection) {
        self.confidence = detection.confidence;
        self.class_id = detection.class_id;
        self.label = detection.label.clone();
        self.tlwh = detection.bbox;
    }

    /// Bag survival across a match merge: carried only when the engine keeps
    /// past metadata, with denylisted kinds always purged.
    fn merge_metadata(&mut self, keep_past_metadata: bool, denylist: &[MetadataKind]) {
        if keep_past_metadata {
            self.metadata.retain(|m| !denylist.contains(&m.kind()));
        } else {
            self.metadata.clear();
        }
    }

    /// Attach a metadata value unless its kind is denylisted. Returns
    /// whether the value was attached.
    pub(crate) fn attach(&mut self, metadata: Metadata, denylist: &[MetadataKind]) -> bool {
        if denylist.contains(&metadata.kind()) {
            return false;
        }
        self.metadata.push(metadata);
        true
    }

    /// Remove every bag entry of the given kind. Idempotent.
    pub(crate) fn remove_by_kind(&mut self, kind: MetadataKind) {
        self.metadata.retain(|m| m.kind() != kind);
    }

    /// Remove classifications whose classifier tag matches. Idempotent.
    pub(crate) fn remove_classifications(&mut self, classifier: &str) {
        self.metadata.retain(|m| {
            !matches!(m, Metadata::Classification { classifier: tag, .. } if tag == classifier)
        });
    }

    pub(crate) fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub(crate) fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if let (Some(mean), Some(cov)) = (&self.mean, &self.covariance) {
            let mut mean_to_predict = mean.clone();
            if self.state != TrackState::Tracked {
                mean_to_predict[7] = 0.0;
            }
            let (new_mean, new_cov) = kalman_filter.predict(&mean_to_predict, cov);
            self.mean = Some(new_mean);
            self.covariance = Some(new_cov);
        }
    }

    pub(crate) fn multi_predict(tracks: &mut [Track], kalman_filter: &KalmanFilter) {
        for track in tracks.iter_mut() {
            track.predict(kalman_filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::metadata::DEFAULT_METADATA_DENYLIST;

    fn detection(x: f32, y: f32, confidence: f32) -> Detection {
        Detection::new(Rect::new(x, y, 0.1, 0.2), confidence)
    }

    fn classification(classifier: &str, label: &str) -> Metadata {
        Metadata::Classification {
            classifier: classifier.to_string(),
            label: label.to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_activate_starts_unconfirmed() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 5, 7, false);

        assert_eq!(track.track_id(), 7);
        assert_eq!(track.state(), TrackState::New);
        assert_eq!(track.start_frame(), 5);
        assert_eq!(track.end_frame(), 5);

        // Motion state reproduces the detection box.
        let rect = track.rect();
        assert!((rect.x - 0.2).abs() < 1e-5);
        assert!((rect.y - 0.3).abs() < 1e-5);
        assert!((rect.width - 0.1).abs() < 1e-5);
        assert!((rect.height - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_activate_confirmed_on_first_sight() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 1, 1, true);
        assert_eq!(track.state(), TrackState::Tracked);
    }

    #[test]
    fn test_update_confirms_and_adopts_detection() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 1, 1, false);

        let mut next = detection(0.2, 0.3, 0.75);
        next.class_id = 2;
        next.label = Some("car".to_string());
        track.update(&next, &kf, 2, true, &DEFAULT_METADATA_DENYLIST);

        assert_eq!(track.state(), TrackState::Tracked);
        assert_eq!(track.end_frame(), 2);
        assert_eq!(track.confidence(), 0.75);
        assert_eq!(track.class_id(), 2);
        assert_eq!(track.label(), Some("car"));
    }

    #[test]
    fn test_re_activate_recovers_lost_track() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 1, 1, false);
        track.update(&detection(0.2, 0.3, 0.9), &kf, 2, true, &[]);
        track.mark_lost();
        assert_eq!(track.state(), TrackState::Lost);

        track.re_activate(
            &detection(0.2, 0.3, 0.8),
            &kf,
            5,
            None,
            true,
            &DEFAULT_METADATA_DENYLIST,
        );
        assert_eq!(track.state(), TrackState::Tracked);
        assert_eq!(track.track_id(), 1);
        assert_eq!(track.end_frame(), 5);

        track.mark_lost();
        track.re_activate(
            &detection(0.2, 0.3, 0.8),
            &kf,
            8,
            Some(9),
            true,
            &DEFAULT_METADATA_DENYLIST,
        );
        assert_eq!(track.track_id(), 9);
    }

    #[test]
    fn test_attach_respects_denylist() {
        let mut track = Track::new(detection(0.2, 0.3, 0.9));

        assert!(track.attach(classification("color", "red"), &DEFAULT_METADATA_DENYLIST));
        assert!(!track.attach(
            Metadata::Landmarks {
                label: "face".to_string(),
                points: vec![(0.5, 0.5)],
            },
            &DEFAULT_METADATA_DENYLIST,
        ));
        assert_eq!(track.metadata().len(), 1);
    }

    #[test]
    fn test_merge_drops_bag_without_keep_past() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 1, 1, false);
        track.attach(classification("color", "red"), &[]);

        track.update(&detection(0.2, 0.3, 0.9), &kf, 2, false, &[]);
        assert!(track.metadata().is_empty());
    }

    #[test]
    fn test_merge_purges_denylisted_kinds() {
        let kf = KalmanFilter::new();
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.activate(&kf, 1, 1, false);
        // Attached while allowed, denylisted by the time of the merge.
        track.attach(classification("color", "red"), &[]);

        track.update(
            &detection(0.2, 0.3, 0.9),
            &kf,
            2,
            true,
            &[MetadataKind::Classification],
        );
        assert!(track.metadata().is_empty());
    }

    #[test]
    fn test_remove_by_kind_idempotent() {
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.attach(classification("color", "red"), &[]);
        track.attach(
            Metadata::UserPayload {
                label: "notes".to_string(),
                bytes: vec![1, 2, 3],
            },
            &[],
        );

        track.remove_by_kind(MetadataKind::Classification);
        assert_eq!(track.metadata().len(), 1);
        track.remove_by_kind(MetadataKind::Classification);
        assert_eq!(track.metadata().len(), 1);
    }

    #[test]
    fn test_remove_classifications_by_tag() {
        let mut track = Track::new(detection(0.2, 0.3, 0.9));
        track.attach(classification("color", "red"), &[]);
        track.attach(classification("gender", "unknown"), &[]);

        track.remove_classifications("color");
        assert_eq!(track.metadata().len(), 1);
        assert!(matches!(
            &track.metadata()[0],
            Metadata::Classification { classifier, .. } if classifier == "gender"
        ));
    }
}

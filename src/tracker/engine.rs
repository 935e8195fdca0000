//! Per-stream tracking engine: the frame-by-frame association cascade.

use crate::tracker::detection::{Detection, TrackedDetection};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::metadata::{DEFAULT_METADATA_DENYLIST, Metadata, MetadataKind};
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Two live tracks overlapping above this IoU are duplicates of one object.
const DUPLICATE_IOU: f32 = 0.85;

/// Tunable parameters for one stream's engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fused IoU/motion cost ceiling for the first association pass.
    pub kalman_distance: f32,
    /// IoU distance ceiling for the low-confidence second pass.
    pub iou_threshold: f32,
    /// IoU distance ceiling for matching unconfirmed tracks.
    pub init_iou_threshold: f32,
    /// Frames an unmatched track stays Tracked before turning Lost.
    pub keep_tracked_frames: u32,
    /// Frames an unmatched New track survives before removal.
    pub keep_new_frames: u32,
    /// Frames an unmatched Lost track survives before removal.
    pub keep_lost_frames: u32,
    /// Carry the metadata bag across match merges.
    pub keep_past_metadata: bool,
    /// Keep the identity when a Lost track is re-identified.
    pub preserve_lost_identity: bool,
    /// Seed new tracks directly into Tracked, reporting first sightings.
    pub activate_on_first_sight: bool,
    /// Confidence splitting the high tier from the low tier.
    pub high_conf_threshold: f32,
    /// Detections at or below this confidence are discarded.
    pub low_conf_floor: f32,
    /// Minimum confidence for an unmatched detection to seed a track.
    pub new_track_threshold: f32,
    /// Motion noise weight for the box center.
    pub std_weight_position: f32,
    /// Motion noise weight for aspect ratio and height.
    pub std_weight_position_box: f32,
    /// Motion noise weight for center velocity.
    pub std_weight_velocity: f32,
    /// Motion noise weight for aspect/height velocity.
    pub std_weight_velocity_box: f32,
    /// Also report New tracks from `update`.
    pub report_unconfirmed: bool,
    /// Also report Lost tracks from `update`.
    pub report_lost: bool,
    /// Attach a "tracking" classification naming each output's lifecycle state.
    pub debug: bool,
    /// Metadata kinds refused on attach and purged at merges.
    pub metadata_denylist: Vec<MetadataKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kalman_distance: 0.7,
            iou_threshold: 0.8,
            init_iou_threshold: 0.9,
            keep_tracked_frames: 0,
            keep_new_frames: 2,
            keep_lost_frames: 2,
            keep_past_metadata: true,
            preserve_lost_identity: true,
            activate_on_first_sight: false,
            high_conf_threshold: 0.5,
            low_conf_floor: 0.1,
            new_track_threshold: 0.6,
            std_weight_position: 0.01,
            std_weight_position_box: 1e-8,
            std_weight_velocity: 0.001,
            std_weight_velocity_box: 1e-8,
            report_unconfirmed: false,
            report_lost: false,
            debug: false,
            metadata_denylist: DEFAULT_METADATA_DENYLIST.to_vec(),
        }
    }
}

/// A single runtime-adjustable engine parameter.
#[derive(Debug, Clone)]
pub enum Parameter {
    KalmanDistance(f32),
    IouThreshold(f32),
    InitIouThreshold(f32),
    KeepTrackedFrames(u32),
    KeepNewFrames(u32),
    KeepLostFrames(u32),
    KeepPastMetadata(bool),
    PreserveLostIdentity(bool),
    ActivateOnFirstSight(bool),
    HighConfThreshold(f32),
    LowConfFloor(f32),
    NewTrackThreshold(f32),
    StdWeightPosition(f32),
    StdWeightPositionBox(f32),
    StdWeightVelocity(f32),
    StdWeightVelocityBox(f32),
    ReportUnconfirmed(bool),
    ReportLost(bool),
    Debug(bool),
    MetadataDenylist(Vec<MetadataKind>),
}

/// Tracking engine for one named stream.
#[derive(Debug)]
pub struct TrackerEngine {
    config: EngineConfig,
    kalman_filter: KalmanFilter,
    frame_id: u32,
    next_track_id: u64,
    tracked_tracks: Vec<Track>,
    lost_tracks: Vec<Track>,
    unconfirmed_tracks: Vec<Track>,
}

impl Default for TrackerEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TrackerEngine {
    pub fn new(config: EngineConfig) -> Self {
        let kalman_filter = KalmanFilter::with_weights(
            f64::from(config.std_weight_position),
            f64::from(config.std_weight_position_box),
            f64::from(config.std_weight_velocity),
            f64::from(config.std_weight_velocity_box),
        );
        Self {
            config,
            kalman_filter,
            frame_id: 0,
            next_track_id: 0,
            tracked_tracks: Vec::new(),
            lost_tracks: Vec::new(),
            unconfirmed_tracks: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Currently confirmed tracks.
    pub fn tracked_tracks(&self) -> &[Track] {
        &self.tracked_tracks
    }

    /// Apply a runtime parameter change.
    pub fn apply_parameter(&mut self, parameter: Parameter) {
        match parameter {
            Parameter::KalmanDistance(v) => self.config.kalman_distance = v,
            Parameter::IouThreshold(v) => self.config.iou_threshold = v,
            Parameter::InitIouThreshold(v) => self.config.init_iou_threshold = v,
            Parameter::KeepTrackedFrames(v) => self.config.keep_tracked_frames = v,
            Parameter::KeepNewFrames(v) => self.config.keep_new_frames = v,
            Parameter::KeepLostFrames(v) => self.config.keep_lost_frames = v,
            Parameter::KeepPastMetadata(v) => self.config.keep_past_metadata = v,
            Parameter::PreserveLostIdentity(v) => self.config.preserve_lost_identity = v,
            Parameter::ActivateOnFirstSight(v) => self.config.activate_on_first_sight = v,
            Parameter::HighConfThreshold(v) => self.config.high_conf_threshold = v,
            Parameter::LowConfFloor(v) => self.config.low_conf_floor = v,
            Parameter::NewTrackThreshold(v) => self.config.new_track_threshold = v,
            Parameter::StdWeightPosition(v) => {
                self.config.std_weight_position = v;
                self.rebuild_motion_model();
            }
            Parameter::StdWeightPositionBox(v) => {
                self.config.std_weight_position_box = v;
                self.rebuild_motion_model();
            }
            Parameter::StdWeightVelocity(v) => {
                self.config.std_weight_velocity = v;
                self.rebuild_motion_model();
            }
            Parameter::StdWeightVelocityBox(v) => {
                self.config.std_weight_velocity_box = v;
                self.rebuild_motion_model();
            }
            Parameter::ReportUnconfirmed(v) => self.config.report_unconfirmed = v,
            Parameter::ReportLost(v) => self.config.report_lost = v,
            Parameter::Debug(v) => self.config.debug = v,
            Parameter::MetadataDenylist(kinds) => self.config.metadata_denylist = kinds,
        }
    }

    fn rebuild_motion_model(&mut self) {
        self.kalman_filter = KalmanFilter::with_weights(
            f64::from(self.config.std_weight_position),
            f64::from(self.config.std_weight_position_box),
            f64::from(self.config.std_weight_velocity),
            f64::from(self.config.std_weight_velocity_box),
        );
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_track_id += 1;
        self.next_track_id
    }

    /// Locate a live track (tracked, lost, or unconfirmed) by identity.
    pub(crate) fn find_track_mut(&mut self, track_id: u64) -> Option<&mut Track> {
        self.tracked_tracks
            .iter_mut()
            .chain(self.lost_tracks.iter_mut())
            .chain(self.unconfirmed_tracks.iter_mut())
            .find(|t| t.track_id() == track_id)
    }

    /// Attach metadata to a live track; a stale identity or a denylisted
    /// kind leaves everything unchanged. Returns whether it was attached.
    pub fn attach_metadata(&mut self, track_id: u64, metadata: Metadata) -> bool {
        let denylist = self.config.metadata_denylist.clone();
        match self.find_track_mut(track_id) {
            Some(track) => track.attach(metadata, &denylist),
            None => {
                tracing::debug!("no live track {} to attach metadata to", track_id);
                false
            }
        }
    }

    /// Remove all metadata of a kind from a live track. Stale identities
    /// are a no-op.
    pub fn remove_metadata(&mut self, track_id: u64, kind: MetadataKind) {
        if let Some(track) = self.find_track_mut(track_id) {
            track.remove_by_kind(kind);
        }
    }

    /// Remove classifications with the given classifier tag from a live
    /// track. Stale identities are a no-op.
    pub fn remove_classifications(&mut self, track_id: u64, classifier: &str) {
        if let Some(track) = self.find_track_mut(track_id) {
            track.remove_classifications(classifier);
        }
    }

    /// Run one association cycle over a frame's detections and report the
    /// resulting tracks.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        self.frame_id += 1;
        let frame_id = self.frame_id;
        let keep_past = self.config.keep_past_metadata;
        let denylist = self.config.metadata_denylist.clone();

        // Malformed detections are skipped item by item, never fatal.
        let mut high_dets: Vec<Detection> = Vec::new();
        let mut low_dets: Vec<Detection> = Vec::new();
        for (index, detection) in detections.into_iter().enumerate() {
            if !detection.is_valid() {
                tracing::warn!(
                    "frame {}: dropping malformed detection at index {}",
                    frame_id,
                    index
                );
                continue;
            }
            if detection.confidence >= self.config.high_conf_threshold {
                high_dets.push(detection);
            } else if detection.confidence > self.config.low_conf_floor {
                low_dets.push(detection);
            }
        }

        // Association pool: every confirmed track, predicted one frame
        // ahead. New tracks are not predicted until confirmed.
        let mut pool: Vec<Track> = Vec::with_capacity(
            self.tracked_tracks.len() + self.lost_tracks.len(),
        );
        pool.append(&mut self.tracked_tracks);
        pool.append(&mut self.lost_tracks);
        Track::multi_predict(&mut pool, &self.kalman_filter);

        // First association: high tier against the pool, IoU fused with
        // motion gating.
        let pool_rects: Vec<Rect> = pool.iter().map(|t| t.rect()).collect();
        let high_rects: Vec<Rect> = high_dets.iter().map(|d| d.bbox).collect();
        let mut dists = matching::iou_distance(&pool_rects, &high_rects);
        matching::fuse_motion(&self.kalman_filter, &mut dists, &pool, &high_dets);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.config.kalman_distance);

        let mut matched = matches.len();
        for (itracked, idet) in matches {
            let needs_new_id = !self.config.preserve_lost_identity
                && pool[itracked].state() == TrackState::Lost;
            let new_id = if needs_new_id {
                Some(self.allocate_id())
            } else {
                None
            };
            let detection = &high_dets[idet];
            let track = &mut pool[itracked];
            if track.state() == TrackState::Tracked {
                track.update(detection, &self.kalman_filter, frame_id, keep_past, &denylist);
            } else {
                track.re_activate(detection, &self.kalman_filter, frame_id, new_id, keep_past, &denylist);
            }
        }

        // Second association: low tier against remaining Tracked tracks,
        // IoU only.
        let r_tracked: Vec<usize> = unmatched_tracks
            .iter()
            .copied()
            .filter(|&idx| pool[idx].state() == TrackState::Tracked)
            .collect();

        let r_rects: Vec<Rect> = r_tracked.iter().map(|&idx| pool[idx].rect()).collect();
        let low_rects: Vec<Rect> = low_dets.iter().map(|d| d.bbox).collect();
        let dists_second = matching::iou_distance(&r_rects, &low_rects);

        let AssignmentResult {
            matches: matches_second,
            ..
        } = matching::linear_assignment(&dists_second, self.config.iou_threshold);

        matched += matches_second.len();
        for (itracked, idet) in matches_second {
            let track = &mut pool[r_tracked[itracked]];
            track.update(&low_dets[idet], &self.kalman_filter, frame_id, keep_past, &denylist);
        }

        // Unconfirmed pass: first-pass leftovers against New tracks.
        let mut unconfirmed = std::mem::take(&mut self.unconfirmed_tracks);
        let unconfirmed_rects: Vec<Rect> = unconfirmed.iter().map(|t| t.rect()).collect();
        let leftover_rects: Vec<Rect> = unmatched_detections
            .iter()
            .map(|&idx| high_dets[idx].bbox)
            .collect();
        let dists_unconfirmed = matching::iou_distance(&unconfirmed_rects, &leftover_rects);

        let AssignmentResult {
            matches: matches_unconfirmed,
            unmatched_detections: unmatched_new,
            ..
        } = matching::linear_assignment(&dists_unconfirmed, self.config.init_iou_threshold);

        matched += matches_unconfirmed.len();
        for (itracked, idet) in matches_unconfirmed {
            let detection = &high_dets[unmatched_detections[idet]];
            unconfirmed[itracked].update(detection, &self.kalman_filter, frame_id, keep_past, &denylist);
        }

        // Seed tracks from confident leftovers.
        let mut seeded: Vec<Track> = Vec::new();
        for idx in unmatched_new {
            let detection = &high_dets[unmatched_detections[idx]];
            if detection.confidence < self.config.new_track_threshold {
                continue;
            }
            let track_id = self.allocate_id();
            let mut track = Track::new(detection.clone());
            track.activate(
                &self.kalman_filter,
                frame_id,
                track_id,
                self.config.activate_on_first_sight,
            );
            seeded.push(track);
        }
        let seeded_count = seeded.len();

        // Lifecycle disposal: unmatched Tracked tracks turn Lost once past
        // the grace window; Lost and New tracks age out by retention.
        let mut next_tracked: Vec<Track> = Vec::new();
        let mut next_lost: Vec<Track> = Vec::new();
        let mut next_unconfirmed: Vec<Track> = Vec::new();
        let mut lost_count = 0usize;
        let mut removed_count = 0usize;

        for mut track in pool {
            match track.state() {
                TrackState::Tracked => {
                    if frame_id - track.end_frame() > self.config.keep_tracked_frames {
                        track.mark_lost();
                        lost_count += 1;
                        next_lost.push(track);
                    } else {
                        next_tracked.push(track);
                    }
                }
                TrackState::Lost => {
                    if frame_id - track.end_frame() > self.config.keep_lost_frames {
                        track.mark_removed();
                        removed_count += 1;
                    } else {
                        next_lost.push(track);
                    }
                }
                _ => {}
            }
        }

        for mut track in unconfirmed {
            match track.state() {
                TrackState::Tracked => next_tracked.push(track),
                TrackState::New => {
                    if frame_id - track.end_frame() > self.config.keep_new_frames {
                        track.mark_removed();
                        removed_count += 1;
                    } else {
                        next_unconfirmed.push(track);
                    }
                }
                _ => {}
            }
        }

        for track in seeded {
            if track.state() == TrackState::Tracked {
                next_tracked.push(track);
            } else {
                next_unconfirmed.push(track);
            }
        }

        let (next_tracked, next_lost) = remove_duplicate_tracks(next_tracked, next_lost);
        self.tracked_tracks = next_tracked;
        self.lost_tracks = next_lost;
        self.unconfirmed_tracks = next_unconfirmed;

        tracing::debug!(
            "frame {}: {} high / {} low detections, {} matched, {} seeded, {} lost, {} removed",
            frame_id,
            high_rects.len(),
            low_rects.len(),
            matched,
            seeded_count,
            lost_count,
            removed_count
        );

        let mut outputs: Vec<TrackedDetection> = self
            .tracked_tracks
            .iter()
            .map(|t| self.to_output(t))
            .collect();
        if self.config.report_unconfirmed {
            outputs.extend(self.unconfirmed_tracks.iter().map(|t| self.to_output(t)));
        }
        if self.config.report_lost {
            outputs.extend(self.lost_tracks.iter().map(|t| self.to_output(t)));
        }
        outputs
    }

    fn to_output(&self, track: &Track) -> TrackedDetection {
        let mut metadata = track.metadata().to_vec();
        if self.config.debug {
            // Replace any stale state label from an earlier report.
            metadata.retain(|m| {
                !matches!(m, Metadata::Classification { classifier, .. } if classifier == "tracking")
            });
            metadata.push(Metadata::Classification {
                classifier: "tracking".to_string(),
                label: track.state().as_label().to_string(),
                confidence: 0.0,
            });
        }
        TrackedDetection {
            bbox: track.rect(),
            confidence: track.confidence(),
            class_id: track.class_id(),
            label: track.label().map(str::to_string),
            track_id: track.track_id(),
            state: track.state(),
            metadata,
        }
    }
}

/// Deduplicate heavily overlapping tracked/lost pairs, keeping whichever
/// track has been alive longer.
fn remove_duplicate_tracks(
    tracked: Vec<Track>,
    lost: Vec<Track>,
) -> (Vec<Track>, Vec<Track>) {
    if tracked.is_empty() || lost.is_empty() {
        return (tracked, lost);
    }

    let tracked_rects: Vec<Rect> = tracked.iter().map(|t| t.rect()).collect();
    let lost_rects: Vec<Rect> = lost.iter().map(|t| t.rect()).collect();
    let ious = iou_batch(&tracked_rects, &lost_rects);

    let mut dup_tracked = vec![false; tracked.len()];
    let mut dup_lost = vec![false; lost.len()];

    let (rows, cols) = ious.dim();
    for i in 0..rows {
        for j in 0..cols {
            if ious[[i, j]] > DUPLICATE_IOU {
                let time_tracked = tracked[i].end_frame() - tracked[i].start_frame();
                let time_lost = lost[j].end_frame() - lost[j].start_frame();
                if time_tracked > time_lost {
                    dup_lost[j] = true;
                } else {
                    dup_tracked[i] = true;
                }
            }
        }
    }

    let tracked = tracked
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dup_tracked[*i])
        .map(|(_, t)| t)
        .collect();
    let lost = lost
        .into_iter()
        .enumerate()
        .filter(|(j, _)| !dup_lost[*j])
        .map(|(_, t)| t)
        .collect();

    (tracked, lost)
}

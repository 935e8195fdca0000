//! Association cost functions and thresholded optimal assignment.

use crate::tracker::detection::Detection;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::rect::Rect;
use crate::tracker::track::Track;
use ndarray::Array2;

/// Blend weight between IoU distance and motion gating distance.
const GATING_LAMBDA: f32 = 0.98;

/// Cost ties between detections are broken toward the lower index by this
/// per-column bias; it is orders of magnitude below any meaningful cost
/// difference and is excluded from threshold checks.
const TIE_BIAS: f64 = 1e-9;

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_boxes.len(), det_boxes.len()));
    for (i, t) in track_boxes.iter().enumerate() {
        for (j, d) in det_boxes.iter().enumerate() {
            dists[[i, j]] = 1.0 - t.iou(d);
        }
    }
    dists
}

/// Fuse motion plausibility into an IoU cost matrix: pairs whose squared
/// Mahalanobis distance exceeds the 4-DoF chi-square gate become
/// infeasible, the rest blend both distances.
pub fn fuse_motion(
    kalman_filter: &KalmanFilter,
    cost_matrix: &mut Array2<f32>,
    tracks: &[Track],
    detections: &[Detection],
) {
    if cost_matrix.is_empty() {
        return;
    }

    let gate = KalmanFilter::CHI2INV95[4];
    let measurements: Vec<[f64; 4]> = detections.iter().map(|d| d.bbox.to_xyah_f64()).collect();

    for (i, track) in tracks.iter().enumerate() {
        match track.motion() {
            Some((mean, covariance)) => {
                let distances = kalman_filter.gating_distance(mean, covariance, &measurements);
                for j in 0..detections.len() {
                    if distances[j] > gate {
                        cost_matrix[[i, j]] = f32::MAX;
                    } else {
                        cost_matrix[[i, j]] = GATING_LAMBDA * cost_matrix[[i, j]]
                            + (1.0 - GATING_LAMBDA) * distances[j] as f32;
                    }
                }
            }
            None => {
                cost_matrix.row_mut(i).fill(f32::MAX);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: vec![],
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: vec![],
        };
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = f64::from(cost_matrix[[i, j]]) + j as f64 * TIE_BIAS;
        }
    }

    let result = lapjv::lapjv(&padded);
    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask: Vec<bool> = vec![true; num_cols];

    match result {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate() {
                if row_idx >= num_rows {
                    continue;
                }
                if col_idx >= num_cols {
                    unmatched_tracks.push(row_idx);
                } else if cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(err) => {
            tracing::warn!("assignment solve failed ({err:?}), leaving all pairs unmatched");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections: Vec<usize> = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| if u { Some(i) } else { None })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f32]]) -> Array2<f32> {
        let mut m = Array2::zeros((rows.len(), rows[0].len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m[[i, j]] = v;
            }
        }
        m
    }

    #[test]
    fn test_assignment_square() {
        let costs = matrix(&[
            &[0.00288438, 1.0, 1.0],
            &[1.0, 1.0, 0.31932773],
            &[1.0, 0.4, 1.0],
        ]);
        let result = linear_assignment(&costs, 0.9);

        assert_eq!(result.matches, vec![(0, 0), (1, 2), (2, 1)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());

        let total: f32 = result
            .matches
            .iter()
            .map(|&(i, j)| costs[[i, j]])
            .sum();
        assert!((total - 0.72221211).abs() < 1e-6);
    }

    #[test]
    fn test_assignment_rectangular() {
        let costs = matrix(&[&[0.00288438, 1.0], &[1.0, 1.0], &[1.0, 0.4]]);
        let result = linear_assignment(&costs, 0.9);

        assert_eq!(result.matches, vec![(0, 0), (2, 1)]);
        assert_eq!(result.unmatched_tracks, vec![1]);
        assert!(result.unmatched_detections.is_empty());

        let total: f32 = result
            .matches
            .iter()
            .map(|&(i, j)| costs[[i, j]])
            .sum();
        assert!((total - 0.40288438).abs() < 1e-6);
    }

    #[test]
    fn test_assignment_tie_breaks_to_lower_index() {
        let costs = matrix(&[&[0.2, 0.2]]);
        let result = linear_assignment(&costs, 0.5);

        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_assignment_threshold_rejects() {
        let costs = matrix(&[&[0.95]]);
        let result = linear_assignment(&costs, 0.9);

        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_assignment_empty_inputs() {
        let no_tracks = Array2::<f32>::zeros((0, 3));
        let result = linear_assignment(&no_tracks, 0.9);
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);
        assert!(result.unmatched_tracks.is_empty());

        let no_detections = Array2::<f32>::zeros((2, 0));
        let result = linear_assignment(&no_detections, 0.9);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_iou_distance() {
        let a = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        let b = [Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(20.0, 20.0, 5.0, 5.0)];
        let dists = iou_distance(&a, &b);
        assert!((dists[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((dists[[0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_motion_gates_implausible_pairs() {
        let kf = KalmanFilter::new();
        let rect = Rect::new(0.2, 0.2, 0.1, 0.1);
        let mut track = Track::new(Detection::new(rect, 0.9));
        track.activate(&kf, 1, 1, false);

        let detections = [
            Detection::new(rect, 0.9),
            Detection::new(Rect::new(0.7, 0.7, 0.1, 0.1), 0.9),
        ];
        let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let mut costs = iou_distance(&[track.rect()], &det_boxes);
        fuse_motion(&kf, &mut costs, std::slice::from_ref(&track), &detections);

        // Same box: zero IoU distance and zero gating distance.
        assert!(costs[[0, 0]] < 1e-4);
        // Far box: outside the chi-square gate.
        assert_eq!(costs[[0, 1]], f32::MAX);
    }

    #[test]
    fn test_fuse_motion_without_motion_state() {
        let kf = KalmanFilter::new();
        let rect = Rect::new(0.2, 0.2, 0.1, 0.1);
        let track = Track::new(Detection::new(rect, 0.9));

        let detections = [Detection::new(rect, 0.9)];
        let mut costs = iou_distance(&[track.rect()], &[rect]);
        fuse_motion(&kf, &mut costs, std::slice::from_ref(&track), &detections);

        assert_eq!(costs[[0, 0]], f32::MAX);
    }
}

//! Kalman filter for bounding box tracking using ndarray and a nalgebra-based inverse.
//!
//! State space is (cx, cy, aspect, height) plus velocities, with a
//! constant-velocity transition and direct observation of the first four
//! components. All noise standard deviations scale with the current height
//! estimate, weighted by four configurable weights.

use ndarray::{Array1, Array2};

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    std_weight_position: f64,
    std_weight_position_box: f64,
    std_weight_velocity: f64,
    std_weight_velocity_box: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// 0.95 quantile of the chi-square distribution, indexed by degrees of
    /// freedom. Used as the Mahalanobis gate during association.
    pub const CHI2INV95: [f64; 10] = [
        0.0, 3.8415, 5.9915, 7.8147, 9.4877, 11.070, 12.592, 14.067, 15.507, 16.919,
    ];

    pub fn new() -> Self {
        Self::with_weights(0.01, 0.01, 0.001, 0.001)
    }

    /// Build a filter with explicit noise weights: center position,
    /// aspect/height, center velocity, aspect/height velocity.
    pub fn with_weights(
        std_weight_position: f64,
        std_weight_position_box: f64,
        std_weight_velocity: f64,
        std_weight_velocity_box: f64,
    ) -> Self {
        let ndim = 4;
        let mut motion_mat = Array2::eye(2 * ndim);
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((ndim, 2 * ndim));
        for i in 0..ndim {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position,
            std_weight_position_box,
            std_weight_velocity,
            std_weight_velocity_box,
        }
    }

    pub fn initiate(&self, measurement: [f64; 4]) -> (Array1<f64>, Array2<f64>) {
        let mut mean = Array1::zeros(8);
        for i in 0..4 {
            mean[i] = measurement[i];
        }

        let h = measurement[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position_box * h,
            2.0 * self.std_weight_position_box * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            5.0 * self.std_weight_velocity_box * h,
            5.0 * self.std_weight_velocity_box * h,
        ];

        let mut cov = Array2::zeros((8, 8));
        for i in 0..8 {
            cov[[i, i]] = std[i] * std[i];
        }

        (mean, cov)
    }

    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            self.std_weight_position_box * h,
            self.std_weight_position_box * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity_box * h,
            self.std_weight_velocity_box * h,
        ];

        let mut motion_cov = Array2::zeros((8, 8));
        for i in 0..8 {
            motion_cov[[i, i]] = std[i] * std[i];
        }

        let new_mean = self.motion_mat.dot(mean);
        let new_covariance = self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + motion_cov;

        (new_mean, new_covariance)
    }

    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            self.std_weight_position_box * h,
            self.std_weight_position_box * h,
        ];

        let mut innovation_cov = Array2::zeros((4, 4));
        for i in 0..4 {
            innovation_cov[[i, i]] = std[i] * std[i];
        }

        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean_proj, covariance_proj)
    }

    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 4],
    ) -> (Array1<f64>, Array2<f64>) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let measurement_arr = Array1::from_vec(measurement.to_vec());
        let innovation = measurement_arr - projected_mean;

        // K = P * H^T * S^-1
        // Since H is [I 0], P * H^T is the first 4 columns of P (8x4).
        // S is projected_cov (4x4).

        // We use nalgebra internally for 4x4 inversion to avoid BLAS/LAPACK.
        let s_inv = self.invert_4x4(&projected_cov);

        let pht = covariance.dot(&self.update_mat.t()); // 8x4
        let kalman_gain = pht.dot(&s_inv); // 8x4

        let new_mean = mean + kalman_gain.dot(&innovation);
        let new_covariance = covariance - kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        (new_mean, new_covariance)
    }

    /// Squared Mahalanobis distance of each XYAH measurement from the
    /// projected state distribution.
    pub fn gating_distance(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurements: &[[f64; 4]],
    ) -> Array1<f64> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let s_inv = self.invert_4x4(&projected_cov);

        let mut distances = Array1::zeros(measurements.len());
        for (k, measurement) in measurements.iter().enumerate() {
            let mut d = Array1::zeros(4);
            for i in 0..4 {
                d[i] = measurement[i] - projected_mean[i];
            }
            distances[k] = d.dot(&s_inv.dot(&d));
        }
        distances
    }

    /// Helper to invert a 4x4 matrix using nalgebra (pure Rust).
    fn invert_4x4(&self, m: &Array2<f64>) -> Array2<f64> {
        let mut nm = nalgebra::Matrix4::zeros();
        for i in 0..4 {
            for j in 0..4 {
                nm[(i, j)] = m[[i, j]];
            }
        }
        let inv = nm.try_inverse().expect("4x4 matrix inversion failed");
        let mut res = Array2::zeros((4, 4));
        for i in 0..4 {
            for j in 0..4 {
                res[[i, j]] = inv[(i, j)];
            }
        }
        res
    }
}

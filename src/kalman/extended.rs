// Extended Kalman Filter engine
//
// Generic prediction/correction recursion over mean and covariance. The
// model layer (kalman::speed) decides what matrices to feed in; this
// module owns the mean and covariance and is their sole mutator.

use nalgebra as na;
use na::{DMatrix, DVector};

/// Extended Kalman filter state: estimate mean and covariance.
#[derive(Debug, Clone)]
pub struct ExtendedFilter {
    state: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl ExtendedFilter {
    /// Create a filter with the given initial mean and covariance.
    /// Covariance must be square with the state's dimension.
    pub fn new(state: DVector<f64>, covariance: DMatrix<f64>) -> Self {
        debug_assert_eq!(covariance.nrows(), state.len());
        debug_assert_eq!(covariance.ncols(), state.len());
        ExtendedFilter { state, covariance }
    }

    /// Current state estimate mean.
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    /// Current estimate covariance.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Prediction step.
    ///
    /// The caller evaluates the (possibly nonlinear) transition function
    /// and its linearization at the current estimate:
    ///
    ///   x <- f
    ///   P <- F P Fᵀ + L Q Lᵀ
    ///
    /// # Arguments
    /// * `predicted_state` - f(x, u), the propagated state mean
    /// * `transition` - F, Jacobian of f with respect to the state
    /// * `noise_injection` - L, Jacobian of f with respect to process noise
    /// * `process_noise` - Q, process noise covariance
    pub fn predict(
        &mut self,
        predicted_state: DVector<f64>,
        transition: &DMatrix<f64>,
        noise_injection: &DMatrix<f64>,
        process_noise: &DMatrix<f64>,
    ) {
        self.state = predicted_state;
        self.covariance = transition * &self.covariance * transition.transpose()
            + noise_injection * process_noise * noise_injection.transpose();
    }

    /// Correction step.
    ///
    /// The caller evaluates the observation function h and its Jacobian H
    /// at the current estimate:
    ///
    ///   S = H P Hᵀ + M R Mᵀ
    ///   K = P Hᵀ S⁻¹
    ///   x <- x + K (y - h)
    ///   P <- (I - K H) P
    ///
    /// Returns false without touching the state when S is singular or the
    /// update would produce a non-finite mean or covariance. A rejected
    /// correction must never poison the filter.
    pub fn correct(
        &mut self,
        measurement: &DVector<f64>,
        predicted_measurement: &DVector<f64>,
        jacobian: &DMatrix<f64>,
        measurement_transform: &DMatrix<f64>,
        measurement_noise: &DMatrix<f64>,
    ) -> bool {
        let innovation_cov = jacobian * &self.covariance * jacobian.transpose()
            + measurement_transform * measurement_noise * measurement_transform.transpose();

        let innovation_cov_inv = match innovation_cov.try_inverse() {
            Some(inv) => inv,
            None => return false,
        };

        let gain = &self.covariance * jacobian.transpose() * innovation_cov_inv;
        let innovation = measurement - predicted_measurement;

        let state = &self.state + &gain * innovation;
        let n = self.state.len();
        let covariance = (DMatrix::identity(n, n) - &gain * jacobian) * &self.covariance;

        if !state.iter().all(|v| v.is_finite()) || !covariance.iter().all(|v| v.is_finite()) {
            return false;
        }

        self.state = state;
        self.covariance = covariance;
        true
    }
}

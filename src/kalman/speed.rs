// Speed filter model
//
// Fuses 3-axis acceleration (process input) with scalar ground speed
// (measurement) over a 3-component velocity state. The process model is
// plain kinematic integration; the observation y = |v| is nonlinear, which
// is what makes this an *extended* Kalman filter: the correction step
// linearizes the speed function at the current estimate.

use nalgebra as na;
use na::{DMatrix, DVector, Vector3};

use super::extended::ExtendedFilter;
use crate::constants::{
    DEFAULT_INITIAL_COVARIANCE, DEFAULT_INITIAL_VELOCITY, DEFAULT_MEASUREMENT_VARIANCE,
    DEFAULT_SAMPLE_PERIOD, KMH_TO_MS, MIN_OBSERVABLE_SPEED,
};

/// Fixed filter parameters, set once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SpeedFilterConfig {
    /// Sampling period in seconds.
    pub sample_period: f64,
    /// Initial velocity per axis (m/s). Must be non-zero so the first
    /// observation Jacobian has a defined direction.
    pub initial_velocity: f64,
    /// Initial covariance scale (diagonal of P0).
    pub initial_covariance: f64,
    /// Speed measurement variance (m/s)^2.
    pub measurement_variance: f64,
}

impl Default for SpeedFilterConfig {
    fn default() -> Self {
        SpeedFilterConfig {
            sample_period: DEFAULT_SAMPLE_PERIOD,
            initial_velocity: DEFAULT_INITIAL_VELOCITY,
            initial_covariance: DEFAULT_INITIAL_COVARIANCE,
            measurement_variance: DEFAULT_MEASUREMENT_VARIANCE,
        }
    }
}

/// Velocity state estimate plus the fixed model matrices.
///
/// State is the 3-component velocity [vx, vy, vz] (m/s). The latest
/// acceleration sample acts as an exogenous control input, not as part of
/// the estimated state. Only the embedded `ExtendedFilter` mutates the
/// velocity and its covariance.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    filter: ExtendedFilter,
    control_input: Vector3<f64>,

    // Constant model matrices (Hk is recomputed every correction, these
    // never change after construction).
    sample_period: f64,
    transition: DMatrix<f64>,            // Fk: velocity -> velocity is identity
    noise_injection: DMatrix<f64>,       // Lk
    process_noise: DMatrix<f64>,         // Qk = dt^2 * I
    measurement_transform: DMatrix<f64>, // Mk
    measurement_noise: DMatrix<f64>,     // Rk
}

impl SpeedFilter {
    pub fn new(config: SpeedFilterConfig) -> Self {
        let dt = config.sample_period;
        let v0 = config.initial_velocity;
        SpeedFilter {
            filter: ExtendedFilter::new(
                DVector::from_vec(vec![v0, v0, v0]),
                DMatrix::identity(3, 3) * config.initial_covariance,
            ),
            control_input: Vector3::zeros(),
            sample_period: dt,
            transition: DMatrix::identity(3, 3),
            noise_injection: DMatrix::identity(3, 3),
            process_noise: DMatrix::identity(3, 3) * (dt * dt),
            measurement_transform: DMatrix::identity(1, 1),
            measurement_noise: DMatrix::from_element(1, 1, config.measurement_variance),
        }
    }

    /// Current velocity estimate (m/s).
    pub fn velocity(&self) -> Vector3<f64> {
        let state = self.filter.state();
        Vector3::new(state[0], state[1], state[2])
    }

    /// Current estimate covariance.
    pub fn covariance(&self) -> &DMatrix<f64> {
        self.filter.covariance()
    }

    /// Most recently stored acceleration input (m/s^2).
    pub fn control_input(&self) -> Vector3<f64> {
        self.control_input
    }

    /// Store a new acceleration sample as the control input for future
    /// predictions. Callers must run `predict_step` first: the prediction
    /// covering the elapsed interval uses the *previous* input, consistent
    /// with the constant-acceleration-over-interval assumption.
    pub fn set_control_input(&mut self, accel: Vector3<f64>) {
        self.control_input = accel;
    }

    /// Process model forward function: v + dt * u.
    pub fn predicted_state(&self) -> Vector3<f64> {
        self.velocity() + self.sample_period * self.control_input
    }

    /// Run one prediction step using the stored control input.
    pub fn predict_step(&mut self) {
        let predicted = self.predicted_state();
        self.filter.predict(
            DVector::from_vec(vec![predicted.x, predicted.y, predicted.z]),
            &self.transition,
            &self.noise_injection,
            &self.process_noise,
        );
    }

    /// Observation forward function: h(v) = |v|.
    pub fn predicted_measurement(velocity: &Vector3<f64>) -> f64 {
        velocity.norm()
    }

    /// Observation Jacobian dh/dv = v / |v|, the unit vector along the
    /// current velocity as a 1x3 row. Undefined at |v| ~ 0; returns None
    /// there so the caller skips the correction for that cycle instead of
    /// propagating a division by zero into the covariance.
    pub fn observation_jacobian(velocity: &Vector3<f64>) -> Option<DMatrix<f64>> {
        let norm = velocity.norm();
        if norm < MIN_OBSERVABLE_SPEED {
            return None;
        }
        Some(DMatrix::from_row_slice(
            1,
            3,
            &[velocity.x / norm, velocity.y / norm, velocity.z / norm],
        ))
    }

    /// Run one correction step against a raw speed measurement in km/h.
    ///
    /// Returns false when the correction was skipped: degenerate
    /// linearization point (velocity at zero) or a numerically rejected
    /// update. State is untouched in either case.
    pub fn correct_step(&mut self, speed_kmh: f64) -> bool {
        let velocity = self.velocity();

        let jacobian = match Self::observation_jacobian(&velocity) {
            Some(j) => j,
            None => return false,
        };
        let predicted = DVector::from_vec(vec![Self::predicted_measurement(&velocity)]);
        let measurement = DVector::from_vec(vec![speed_kmh * KMH_TO_MS]);

        self.filter.correct(
            &measurement,
            &predicted,
            &jacobian,
            &self.measurement_transform,
            &self.measurement_noise,
        )
    }

    /// Filtered scalar speed: |v| rounded to one decimal place.
    pub fn filtered_speed(&self) -> f64 {
        round_to_tenth(self.filter.state().norm())
    }
}

/// Round to one decimal place (sensor jitter suppression, output format).
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_integrates_acceleration() {
        // Initial velocity (1e-4, 1e-4, 1e-4), dt = 0.1, accel (1, 0, 0):
        // one prediction gives (0.1001, 1e-4, 1e-4)
        let mut filter = SpeedFilter::new(SpeedFilterConfig::default());
        filter.set_control_input(Vector3::new(1.0, 0.0, 0.0));
        filter.predict_step();

        let v = filter.velocity();
        assert!((v.x - 0.1001).abs() < 1e-12);
        assert!((v.y - 0.0001).abs() < 1e-12);
        assert!((v.z - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_linear_in_dt() {
        let accel = Vector3::new(2.0, -1.0, 0.0);

        let mut short = SpeedFilter::new(SpeedFilterConfig {
            sample_period: 0.1,
            ..Default::default()
        });
        let mut long = SpeedFilter::new(SpeedFilterConfig {
            sample_period: 0.2,
            ..Default::default()
        });
        short.set_control_input(accel);
        long.set_control_input(accel);

        let short_delta = short.predicted_state() - short.velocity();
        let long_delta = long.predicted_state() - long.velocity();

        // Doubling dt doubles the acceleration contribution
        assert!((long_delta - short_delta * 2.0).norm() < 1e-12);
    }

    #[test]
    fn test_prediction_grows_covariance() {
        let mut filter = SpeedFilter::new(SpeedFilterConfig::default());
        let before = filter.covariance().clone();
        filter.predict_step();
        let after = filter.covariance();

        // P + dt^2 * I with dt = 0.1
        for i in 0..3 {
            assert!((after[(i, i)] - before[(i, i)] - 0.01).abs() < 1e-12);
        }
    }

    #[test]
    fn test_observation_model_at_3_4_0() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert!((SpeedFilter::predicted_measurement(&v) - 5.0).abs() < 1e-12);

        let jac = SpeedFilter::observation_jacobian(&v).unwrap();
        assert!((jac[(0, 0)] - 0.6).abs() < 1e-12);
        assert!((jac[(0, 1)] - 0.8).abs() < 1e-12);
        assert!(jac[(0, 2)].abs() < 1e-12);
    }

    #[test]
    fn test_jacobian_is_unit_vector() {
        for v in [
            Vector3::new(0.0001, 0.0001, 0.0001),
            Vector3::new(-5.0, 12.0, 3.0),
            Vector3::new(0.0, 0.0, 1e-6),
            Vector3::new(100.0, 0.0, 0.0),
        ] {
            let jac = SpeedFilter::observation_jacobian(&v).unwrap();
            let norm = (jac[(0, 0)].powi(2) + jac[(0, 1)].powi(2) + jac[(0, 2)].powi(2)).sqrt();
            assert!((norm - 1.0).abs() < 1e-10, "not unit for {:?}", v);
        }
    }

    #[test]
    fn test_zero_velocity_skips_correction() {
        assert!(SpeedFilter::observation_jacobian(&Vector3::zeros()).is_none());

        let mut filter = SpeedFilter::new(SpeedFilterConfig {
            initial_velocity: 0.0,
            ..Default::default()
        });
        let before = filter.velocity();
        let applied = filter.correct_step(36.0);

        assert!(!applied);
        assert_eq!(filter.velocity(), before);
        assert!(filter.covariance().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_correction_pulls_speed_toward_measurement() {
        let mut filter = SpeedFilter::new(SpeedFilterConfig::default());

        // 36 km/h = 10 m/s; repeated corrections should converge
        for _ in 0..50 {
            assert!(filter.correct_step(36.0));
        }
        let speed = filter.velocity().norm();
        assert!((speed - 10.0).abs() < 0.3, "speed = {}", speed);
    }

    #[test]
    fn test_filtered_speed_rounds_to_one_decimal() {
        let mut filter = SpeedFilter::new(SpeedFilterConfig::default());
        for _ in 0..100 {
            filter.correct_step(36.0);
        }
        let speed = filter.filtered_speed();
        assert!((speed * 10.0 - (speed * 10.0).round()).abs() < 1e-9);
        assert!((speed - 10.0).abs() < 0.2);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut filter = SpeedFilter::new(SpeedFilterConfig::default());
        filter.set_control_input(Vector3::new(0.5, -0.3, 0.0));
        for i in 0..20 {
            filter.predict_step();
            if i % 3 == 0 {
                filter.correct_step(20.0);
            }
        }
        let p = filter.covariance();
        for i in 0..3 {
            for j in 0..3 {
                assert!((p[(i, j)] - p[(j, i)]).abs() < 1e-9);
            }
            assert!(p[(i, i)] >= 0.0);
        }
    }

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(1.234), 1.2);
        assert_eq!(round_to_tenth(1.25), 1.3);
        assert_eq!(round_to_tenth(-0.06), -0.1);
    }
}

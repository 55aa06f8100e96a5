// Coordinator - glue between sensor feeds, the speed filter, and outputs
//
// Owns the single shared filter state. The three activation sources
// (acceleration handler, speed handler, publish ticker) each run on their
// own task; every read-modify-write of the filter goes through one mutex
// so prediction, correction, and publish never interleave mid-update and
// the covariance keeps its positive-semi-definite invariant. Samples are
// applied in arrival order; the transport gives no cross-stream
// timestamps, so arrival order is the documented approximation.

use std::sync::Arc;
use std::time::Duration;
use nalgebra::Vector3;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{MAX_ACCEL, MAX_SPEED_KMH};
use crate::kalman::{round_to_tenth, SpeedFilter, SpeedFilterConfig};
use crate::output::{OutputHandler, SpeedSample};

/// Running counters, logged periodically and at shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Acceleration samples accepted (prediction ran).
    pub accel_samples: usize,
    /// Speed samples accepted (correction attempted).
    pub speed_samples: usize,
    /// Samples discarded at the boundary (non-finite or out of range).
    pub rejected_samples: usize,
    /// Corrections skipped: degenerate linearization point or a
    /// numerically rejected update.
    pub skipped_corrections: usize,
    /// Publish ticks emitted.
    pub published: usize,
}

/// Coordinator for the speed filter node.
pub struct Coordinator {
    filter: Mutex<SpeedFilter>,
    outputs: Mutex<Vec<Box<dyn OutputHandler>>>,
    stats: std::sync::Mutex<Stats>,
    /// Last finite published speed; republished if a tick would
    /// otherwise emit a non-finite value.
    last_published: std::sync::Mutex<f64>,
    sample_period: f64,
    status_interval_secs: i32,
}

impl Coordinator {
    /// Create a coordinator with status logging disabled (for tests).
    pub fn new(config: SpeedFilterConfig) -> Self {
        Self::new_with_status(config, -1)
    }

    /// Create a coordinator. When `status_interval > 0`, a status line is
    /// logged every that many seconds from `run()`.
    pub fn new_with_status(config: SpeedFilterConfig, status_interval: i32) -> Self {
        Coordinator {
            filter: Mutex::new(SpeedFilter::new(config)),
            outputs: Mutex::new(Vec::new()),
            stats: std::sync::Mutex::new(Stats::default()),
            last_published: std::sync::Mutex::new(0.0),
            sample_period: config.sample_period,
            status_interval_secs: status_interval,
        }
    }

    /// Add an output handler
    pub async fn add_output(&self, output: Box<dyn OutputHandler>) {
        self.outputs.lock().await.push(output);
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> Stats {
        *self.stats.lock().unwrap()
    }

    /// Current velocity estimate (m/s).
    pub async fn velocity(&self) -> Vector3<f64> {
        self.filter.lock().await.velocity()
    }

    /// Handle a raw acceleration sample (m/s^2).
    ///
    /// The prediction covering the elapsed interval runs with the
    /// *previous* control input; the new sample is stored afterwards.
    /// Each axis is rounded to one decimal against sensor jitter and the
    /// vertical axis is zeroed: vertical acceleration is treated as
    /// unobserved for the ground-speed estimate.
    pub async fn handle_accel(&self, x: f64, y: f64, z: f64) {
        if !(x.is_finite() && y.is_finite() && z.is_finite())
            || x.abs() > MAX_ACCEL
            || y.abs() > MAX_ACCEL
            || z.abs() > MAX_ACCEL
        {
            warn!("Discarding bad acceleration sample ({}, {}, {})", x, y, z);
            self.stats.lock().unwrap().rejected_samples += 1;
            return;
        }

        let accel = Vector3::new(round_to_tenth(x), round_to_tenth(y), 0.0);

        {
            let mut filter = self.filter.lock().await;
            filter.predict_step();
            filter.set_control_input(accel);
        }

        self.stats.lock().unwrap().accel_samples += 1;
    }

    /// Handle a raw ground speed sample (km/h).
    pub async fn handle_speed(&self, kmh: f64) {
        if !kmh.is_finite() || !(0.0..=MAX_SPEED_KMH).contains(&kmh) {
            warn!("Discarding bad speed sample {}", kmh);
            self.stats.lock().unwrap().rejected_samples += 1;
            return;
        }

        let applied = self.filter.lock().await.correct_step(kmh);

        let mut stats = self.stats.lock().unwrap();
        stats.speed_samples += 1;
        if !applied {
            stats.skipped_corrections += 1;
            drop(stats);
            debug!("Correction skipped for speed sample {} km/h", kmh);
        }
    }

    /// Read the current estimate and fan the filtered speed out to all
    /// outputs. A non-finite speed is never emitted: the last valid value
    /// is republished and the anomaly logged.
    pub async fn publish_tick(&self) {
        let speed = self.filter.lock().await.filtered_speed();

        let speed = {
            let mut last = self.last_published.lock().unwrap();
            if speed.is_finite() {
                *last = speed;
                speed
            } else {
                warn!("Non-finite filtered speed, republishing {}", *last);
                *last
            }
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        let sample = SpeedSample { timestamp, speed };

        let mut outputs = self.outputs.lock().await;
        for output in outputs.iter_mut() {
            output.handle_speed(&sample);
        }

        self.stats.lock().unwrap().published += 1;
    }

    /// Periodic loop: publish once per sampling period, independent of
    /// (and unsynchronized with) sample arrival. Runs until the task is
    /// dropped at shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(self.sample_period));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let status_secs = self.status_interval_secs;
        let mut next_status = if status_secs > 0 {
            Some(tokio::time::Instant::now() + Duration::from_secs(status_secs as u64))
        } else {
            None
        };

        loop {
            ticker.tick().await;
            self.publish_tick().await;

            if let Some(ref mut next) = next_status {
                if tokio::time::Instant::now() >= *next {
                    *next += Duration::from_secs(status_secs as u64);
                    self.log_status().await;
                }
            }
        }
    }

    async fn log_status(&self) {
        let stats = self.stats();
        let speed = *self.last_published.lock().unwrap();
        info!(
            "Status: speed {:.1} m/s ({} accel, {} speed, {} rejected, {} skipped, {} published)",
            speed,
            stats.accel_samples,
            stats.speed_samples,
            stats.rejected_samples,
            stats.skipped_corrections,
            stats.published
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CaptureOutput {
        values: Arc<std::sync::Mutex<Vec<f64>>>,
    }

    impl OutputHandler for CaptureOutput {
        fn handle_speed(&mut self, sample: &SpeedSample) {
            self.values.lock().unwrap().push(sample.speed);
        }
    }

    #[tokio::test]
    async fn test_first_accel_predicts_with_zero_input() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());

        // Control input starts at zero, so the first prediction leaves
        // the velocity unchanged; the sample is only stored for the next
        // interval.
        coordinator.handle_accel(1.0, 0.0, 0.0).await;
        let v = coordinator.velocity().await;
        assert!((v.x - 0.0001).abs() < 1e-12);

        // The second sample predicts with the first one
        coordinator.handle_accel(0.0, 0.0, 0.0).await;
        let v = coordinator.velocity().await;
        assert!((v.x - 0.1001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_accel_rounded_and_vertical_zeroed() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());

        coordinator.handle_accel(1.04, -0.26, 9.81).await;
        coordinator.handle_accel(0.0, 0.0, 0.0).await;

        let v = coordinator.velocity().await;
        // dt * (1.0, -0.3, 0.0) on top of the initial 1e-4
        assert!((v.x - 0.1001).abs() < 1e-12);
        assert!((v.y - (-0.0299)).abs() < 1e-12);
        assert!((v.z - 0.0001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_non_finite_accel_rejected() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());
        let before = coordinator.velocity().await;

        coordinator.handle_accel(f64::NAN, 0.0, 0.0).await;

        assert_eq!(coordinator.velocity().await, before);
        let stats = coordinator.stats();
        assert_eq!(stats.rejected_samples, 1);
        assert_eq!(stats.accel_samples, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_speed_rejected() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());

        coordinator.handle_speed(-5.0).await;
        coordinator.handle_speed(1200.0).await;
        coordinator.handle_speed(f64::INFINITY).await;

        let stats = coordinator.stats();
        assert_eq!(stats.rejected_samples, 3);
        assert_eq!(stats.speed_samples, 0);
    }

    #[tokio::test]
    async fn test_speed_sample_corrects_estimate() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());

        for _ in 0..100 {
            coordinator.handle_speed(36.0).await;
        }

        let speed = coordinator.velocity().await.norm();
        assert!((speed - 10.0).abs() < 0.2, "speed = {}", speed);
        assert_eq!(coordinator.stats().skipped_corrections, 0);
    }

    #[tokio::test]
    async fn test_degenerate_correction_counted_as_skipped() {
        let coordinator = Coordinator::new(SpeedFilterConfig {
            initial_velocity: 0.0,
            ..Default::default()
        });

        coordinator.handle_speed(36.0).await;

        let stats = coordinator.stats();
        assert_eq!(stats.speed_samples, 1);
        assert_eq!(stats.skipped_corrections, 1);
        assert!(coordinator.velocity().await.iter().all(|v| v.is_finite()));
    }

    #[tokio::test]
    async fn test_publish_is_idempotent_without_mutation() {
        let coordinator = Coordinator::new(SpeedFilterConfig::default());
        let values = Arc::new(std::sync::Mutex::new(Vec::new()));
        coordinator
            .add_output(Box::new(CaptureOutput {
                values: Arc::clone(&values),
            }))
            .await;

        coordinator.handle_speed(36.0).await;
        coordinator.publish_tick().await;
        coordinator.publish_tick().await;

        let published = values.lock().unwrap().clone();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0], published[1]);
        assert!(published[0].is_finite());
    }
}

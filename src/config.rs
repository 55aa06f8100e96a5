use clap::Parser;

use crate::constants::{
    DEFAULT_INITIAL_COVARIANCE, DEFAULT_INITIAL_VELOCITY, DEFAULT_MEASUREMENT_VARIANCE,
    DEFAULT_SAMPLE_PERIOD,
};
use crate::kalman::SpeedFilterConfig;

/// Speed Filter Server Configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Listen on [host:]port for sensor feed connections (JSON lines).
    #[arg(long, value_name = "ADDR")]
    pub sensor_listen: Vec<String>,

    /// Connect to a host:port and send filtered speed as text lines.
    #[arg(long, value_name = "HOST:PORT")]
    pub speed_connect: Vec<String>,

    /// Listen on a [host:]port and send filtered speed text lines to clients that connect.
    #[arg(long, value_name = "ADDR")]
    pub speed_listen: Vec<String>,

    /// Connect to a host:port and send filtered speed as JSON lines.
    #[arg(long, value_name = "HOST:PORT")]
    pub json_connect: Vec<String>,

    /// Listen on a [host:]port and send filtered speed JSON lines to clients that connect.
    #[arg(long, value_name = "ADDR")]
    pub json_listen: Vec<String>,

    /// Append filtered speed in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Vec<String>,

    /// Sampling period in seconds (prediction interval and publish cadence).
    #[arg(long, default_value_t = DEFAULT_SAMPLE_PERIOD)]
    pub sample_period: f64,

    /// Initial velocity estimate per axis in m/s (must be non-zero).
    #[arg(long, default_value_t = DEFAULT_INITIAL_VELOCITY)]
    pub initial_velocity: f64,

    /// Initial covariance scale (diagonal of P0).
    #[arg(long, default_value_t = DEFAULT_INITIAL_COVARIANCE)]
    pub initial_covariance: f64,

    /// Speed measurement variance in (m/s)^2.
    #[arg(long, default_value_t = DEFAULT_MEASUREMENT_VARIANCE)]
    pub measurement_variance: f64,

    /// Status logging interval in seconds, -1 to disable.
    #[arg(long, default_value_t = 15)]
    pub status_interval: i32,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Filter parameters derived from the command line.
    pub fn filter_config(&self) -> SpeedFilterConfig {
        SpeedFilterConfig {
            sample_period: self.sample_period,
            initial_velocity: self.initial_velocity,
            initial_covariance: self.initial_covariance,
            measurement_variance: self.measurement_variance,
        }
    }
}

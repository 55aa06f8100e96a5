// Shared constants for the speed filter (match the reference node's parameters)

/// km/h to m/s. Matches the reference node's 0.27778 (not the exact 1/3.6).
pub const KMH_TO_MS: f64 = 0.27778;

/// m/s to km/h.
pub const MS_TO_KMH: f64 = 1.0 / KMH_TO_MS;

/// Default sampling period in seconds (10 Hz).
pub const DEFAULT_SAMPLE_PERIOD: f64 = 0.1;

/// Default initial velocity per axis (m/s). Small but non-zero so the
/// observation Jacobian has a defined direction from the first correction.
pub const DEFAULT_INITIAL_VELOCITY: f64 = 0.0001;

/// Default initial covariance scale (diagonal of P0).
pub const DEFAULT_INITIAL_COVARIANCE: f64 = 0.1;

/// Default speed measurement variance (m/s)^2.
pub const DEFAULT_MEASUREMENT_VARIANCE: f64 = 0.1;

/// Velocity magnitude below which the observation Jacobian is treated
/// as undefined and the correction is skipped.
pub const MIN_OBSERVABLE_SPEED: f64 = 1e-9;

/// Acceleration samples outside +/- this bound (m/s^2, ~16 g) are sensor
/// faults and get discarded at the adapter boundary.
pub const MAX_ACCEL: f64 = 160.0;

/// Speed samples above this bound (km/h) get discarded.
pub const MAX_SPEED_KMH: f64 = 400.0;

/// Idle heartbeat interval for TCP outputs (s).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Close a sensor feed connection after this long without a message (s).
pub const FEED_READ_TIMEOUT_SECS: u64 = 150;

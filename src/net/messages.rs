// Sensor wire protocol
// Line-delimited JSON messages from sensor feeds

use serde::{Deserialize, Serialize};

/// Messages sent by sensor feeds, one JSON object per line.
///
/// A single connection may carry both streams; the two sensor kinds are
/// independent and arrive at their own rates.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorMessage {
    /// Scalar ground speed from the positioning receiver, in km/h.
    Speed { kmh: f64 },

    /// 3-axis linear acceleration from the inertial sensor, in m/s^2.
    Accel { x: f64, y: f64, z: f64 },

    /// Keep-alive, no payload.
    Heartbeat {},
}

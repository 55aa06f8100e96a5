// Kalman filter module
// EKF engine plus the velocity/speed fusion model built on it

pub mod extended;
pub mod speed;

pub use extended::ExtendedFilter;
pub use speed::{round_to_tenth, SpeedFilter, SpeedFilterConfig};

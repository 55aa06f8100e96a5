
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod kalman;
pub mod net;
pub mod output;

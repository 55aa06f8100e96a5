// Network module
// Sensor feed ingestion and speed output delivery

pub mod connection;
pub mod feed;
pub mod listener;
pub mod messages;
pub mod output_tcp;

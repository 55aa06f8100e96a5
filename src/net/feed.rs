// Sensor feed handler
// Reads line-delimited JSON sensor messages from one connection and
// dispatches them to the coordinator

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::messages::SensorMessage;
use crate::constants::FEED_READ_TIMEOUT_SECS;
use crate::coordinator::Coordinator;

/// Handler for a single sensor feed connection.
pub struct FeedClient {
    connection: Connection,
    coordinator: Arc<Coordinator>,
    lines_handled: usize,
    lines_rejected: usize,
}

impl FeedClient {
    pub fn new(connection: Connection, coordinator: Arc<Coordinator>) -> Self {
        FeedClient {
            connection,
            coordinator,
            lines_handled: 0,
            lines_rejected: 0,
        }
    }

    /// Run the feed loop until EOF, read error, or idle timeout.
    ///
    /// Malformed lines are logged and dropped without closing the
    /// connection; a broken sensor frame must not take the feed down.
    pub async fn run(&mut self) -> io::Result<()> {
        let peer = self.connection.peer_addr();
        let read_timeout = Duration::from_secs(FEED_READ_TIMEOUT_SECS);
        info!("Sensor feed connected from {}", peer);

        loop {
            let line = match tokio::time::timeout(read_timeout, self.connection.read_line()).await {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => {
                    warn!("Read error from {}: {}", peer, e);
                    break;
                }
                Err(_) => {
                    info!("No recent messages from {}, closing connection", peer);
                    break;
                }
            };

            if line.is_empty() {
                debug!("Feed EOF from {}", peer);
                break;
            }

            match serde_json::from_str::<SensorMessage>(&line) {
                Ok(msg) => {
                    self.lines_handled += 1;
                    self.dispatch(msg).await;
                }
                Err(e) => {
                    self.lines_rejected += 1;
                    warn!("Malformed sensor line from {}: {}", peer, e);
                }
            }
        }

        info!(
            "Sensor feed from {} closed ({} messages, {} rejected)",
            peer, self.lines_handled, self.lines_rejected
        );
        Ok(())
    }

    async fn dispatch(&self, msg: SensorMessage) {
        match msg {
            SensorMessage::Accel { x, y, z } => {
                self.coordinator.handle_accel(x, y, z).await;
            }
            SensorMessage::Speed { kmh } => {
                self.coordinator.handle_speed(kmh).await;
            }
            SensorMessage::Heartbeat {} => {}
        }
    }
}

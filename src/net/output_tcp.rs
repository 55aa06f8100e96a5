// TCP output pumps
// Deliver published speed lines to downstream consumers, either by
// connecting out to a fixed target or by serving clients that connect in.
// Both modes share one pump loop: forward broadcast payloads, send an
// idle heartbeat newline, stop on write failure.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::constants::HEARTBEAT_INTERVAL_SECS;

/// Why a pump loop ended.
enum PumpEnd {
    /// The write side failed; reconnect or drop the client.
    StreamError,
    /// The broadcast channel closed; the node is shutting down.
    ChannelClosed,
}

/// Forward broadcast payloads to one stream until it breaks or the
/// channel closes. Lagged receivers skip ahead with a warning.
async fn pump_stream(
    stream: &mut TcpStream,
    rx: &mut broadcast::Receiver<Vec<u8>>,
    label: &str,
) -> PumpEnd {
    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let payload = tokio::select! {
            result = rx.recv() => match result {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("{} output lagged by {} messages", label, count);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return PumpEnd::ChannelClosed,
            },
            _ = heartbeat.tick() => b"\n".to_vec(),
        };

        if let Err(e) = stream.write_all(&payload).await {
            info!("{} output write error: {}", label, e);
            return PumpEnd::StreamError;
        }
        if let Err(e) = stream.flush().await {
            info!("{} output flush error: {}", label, e);
            return PumpEnd::StreamError;
        }
    }
}

/// Connect to a downstream host:port and forward published lines.
/// Reconnects with a backoff after any failure.
pub async fn run_tcp_connect_output(
    addr: String,
    mut rx: broadcast::Receiver<Vec<u8>>,
    output_type: &str,
) {
    info!("Starting {} output client to {}", output_type, addr);

    loop {
        match TcpStream::connect(&addr).await {
            Ok(mut stream) => {
                info!("Connected to {} output at {}", output_type, addr);
                match pump_stream(&mut stream, &mut rx, output_type).await {
                    PumpEnd::ChannelClosed => {
                        info!("Output channel closed");
                        return;
                    }
                    PumpEnd::StreamError => {}
                }
            }
            Err(e) => {
                warn!("Failed to connect to {} output at {}: {}", output_type, addr, e);
            }
        }

        // Wait before reconnecting
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Listen for downstream clients and forward published lines to each.
pub async fn run_tcp_listen_output(
    addr: String,
    tx: broadcast::Sender<Vec<u8>>,
    output_type: &str,
) {
    let socket_addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid address {}: {}", addr, e);
            return;
        }
    };

    let listener = match TcpListener::bind(socket_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {} output listener on {}: {}", output_type, addr, e);
            return;
        }
    };
    info!("Listening for {} output clients on {}", output_type, addr);

    loop {
        match listener.accept().await {
            Ok((mut stream, peer_addr)) => {
                info!("Accepted {} client connection from {}", output_type, peer_addr);
                let mut client_rx = tx.subscribe();
                let label = format!("{} ({})", output_type, peer_addr);

                tokio::spawn(async move {
                    pump_stream(&mut stream, &mut client_rx, &label).await;
                });
            }
            Err(e) => {
                error!("Accept failed: {}", e);
            }
        }
    }
}

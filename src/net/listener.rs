// TCP listener for sensor feeds
// Accepts connections and spawns a feed handler per client

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::connection::Connection;
use super::feed::FeedClient;
use crate::coordinator::Coordinator;

/// TCP server that accepts sensor feed connections.
pub struct TcpServer {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TcpServer {
    /// Bind and start the accept loop. Each accepted connection gets its
    /// own feed handler task dispatching into the shared coordinator.
    pub async fn start(addr: SocketAddr, coordinator: Arc<Coordinator>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let coordinator = Arc::clone(&coordinator);
                                tokio::spawn(async move {
                                    let connection = Connection::new(stream, peer_addr);
                                    let mut client = FeedClient::new(connection, coordinator);
                                    if let Err(e) = client.run().await {
                                        error!("Feed error from {}: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => error!("Accept error: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Sensor listener shutting down");
                        break;
                    }
                }
            }
        });

        Ok(TcpServer {
            addr: local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut the accept loop down.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

// TCP connection handler
// Buffered line IO over a single sensor feed connection

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// A single line-oriented TCP connection from a sensor feed.
///
/// Sensor feeds are read-only: the server never writes back, so only the
/// buffered read half is kept.
pub struct Connection {
    reader: BufReader<TcpStream>,
    peer_addr: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Connection {
            reader: BufReader::new(stream),
            peer_addr,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one line (messages are line-delimited JSON). Returns an empty
    /// string on EOF.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await?;

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(line)
    }
}

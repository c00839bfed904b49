//! Byte-stream transport to the device.
//!
//! Anything that is `AsyncRead + AsyncWrite` works: a serial port wrapper, a
//! TCP bridge to one, or an in-memory pipe in tests.

use crate::error::ClientError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Read side, owned by the background reader.
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write side, shared by all requests through the write queue.
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Splits a duplex stream into boxed halves.
pub fn split<T>(stream: T) -> (TransportReader, TransportWriter)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (Box::new(read_half), Box::new(write_half))
}

/// Connects to a serial-over-TCP bridge.
pub async fn connect_tcp(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ClientError> {
    tracing::debug!("Connecting to {}...", addr);

    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

    // Frames are small and latency bound.
    stream.set_nodelay(true).ok();

    tracing::debug!("TCP connected to {}", addr);
    Ok(stream)
}

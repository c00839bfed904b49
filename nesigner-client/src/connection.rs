//! Request correlation and write serialization over one transport.

use crate::error::ClientError;
use crate::transport::{self, TransportReader, TransportWriter};
use bytes::Bytes;
use nesigner_protocol::{
    CorrelationId, Decoder, MessageType, ProtocolError, PublicKey, RequestFrame, ResponseFrame,
    WireFrame, IV_SIZE, MAX_PAYLOAD_SIZE,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Read buffer size for transport reads.
    pub read_buffer_size: usize,
    /// Largest response payload accepted from a frame header.
    pub max_payload_size: u32,
    /// How long a request waits for its response. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: MAX_PAYLOAD_SIZE,
            request_timeout: None,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

type Resolver = oneshot::Sender<Result<ResponseFrame, ProtocolError>>;
type PendingMap = HashMap<CorrelationId, Resolver>;

fn lock_pending(pending: &std::sync::Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's pending entry when the request future finishes or is
/// dropped.
struct PendingEntry<'a> {
    pending: &'a std::sync::Mutex<PendingMap>,
    id: CorrelationId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// Counts a write from the moment it queues until it finishes or is dropped.
struct QueuedWrite<'a>(&'a AtomicUsize);

impl<'a> QueuedWrite<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A session with one device over one transport.
///
/// Any number of requests may be in flight. Each waits on its own
/// correlation ID; writes go out one whole frame at a time in the order
/// callers reached the writer lock.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the transport. Lock ownership is the active writer.
    writer: Mutex<Option<TransportWriter>>,
    /// Read half, taken by `read_loop`.
    reader: Mutex<Option<TransportReader>>,
    /// Requests waiting for responses. Never held across an await.
    pending: std::sync::Mutex<PendingMap>,
    /// Writes waiting for or holding the writer.
    queued_writes: AtomicUsize,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a connection over an already open stream.
    pub fn new<T>(stream: T, config: ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = transport::split(stream);
        Self::from_parts(reader, writer, config)
    }

    /// Creates a connection from separately opened halves.
    pub fn from_parts(
        reader: TransportReader,
        writer: TransportWriter,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            config,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            pending: std::sync::Mutex::new(HashMap::new()),
            queued_writes: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Sends a request and waits for the response with the same correlation
    /// ID.
    ///
    /// The payload is sent as given; encrypting it is the caller's job.
    pub async fn request(
        &self,
        message_type: MessageType,
        pubkey: PublicKey,
        iv: [u8; IV_SIZE],
        payload: Bytes,
    ) -> Result<ResponseFrame, ClientError> {
        let (tx, rx) = oneshot::channel();

        let correlation_id = {
            let mut pending = lock_pending(&self.pending);
            // Checked under the lock so shutdown cannot miss this entry.
            if !self.is_connected() {
                return Err(ClientError::TransportClosed);
            }
            let mut id = CorrelationId::random();
            while pending.contains_key(&id) {
                id = CorrelationId::random();
            }
            pending.insert(id, tx);
            id
        };

        let frame = RequestFrame::new(message_type, correlation_id, pubkey, iv, payload);
        tracing::debug!(
            "Sending {} id={} ({} bytes)",
            message_type,
            correlation_id,
            frame.encoded_len()
        );

        let _entry = PendingEntry {
            pending: &self.pending,
            id: correlation_id,
        };
        self.send_and_wait(&frame, rx).await
    }

    async fn send_and_wait(
        &self,
        frame: &RequestFrame,
        rx: oneshot::Receiver<Result<ResponseFrame, ProtocolError>>,
    ) -> Result<ResponseFrame, ClientError> {
        let encoded = frame.encode()?;
        self.enqueue_write(&encoded).await?;

        let outcome = match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx).await.map_err(|_| {
                tracing::debug!("Request id={} timed out", frame.correlation_id);
                ClientError::Timeout
            })?,
            None => rx.await,
        };

        let response = outcome.map_err(|_| {
            tracing::debug!("Request id={} abandoned by reader", frame.correlation_id);
            ClientError::TransportClosed
        })??;

        tracing::debug!(
            "Request id={} got result {}",
            frame.correlation_id,
            response.result
        );
        Ok(response)
    }

    /// Writes one complete buffer once every earlier queued write is done.
    pub async fn enqueue_write(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let _queued = QueuedWrite::new(&self.queued_writes);
        let mut writer_guard = self.writer.lock().await;
        match writer_guard.as_mut() {
            Some(writer) => {
                writer.write_all(bytes).await?;
                writer.flush().await?;
                Ok(())
            }
            None => Err(ClientError::TransportClosed),
        }
    }

    /// Reads and dispatches responses until the transport ends (call this in
    /// a background task).
    ///
    /// Returns `Ok(())` on a clean end of stream. A checksum mismatch is
    /// delivered to the request it names and then ends the loop, as does an
    /// oversized frame. Other pending requests are failed with
    /// [`ClientError::TransportClosed`] however the loop ends.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;
        tracing::debug!("read_loop started");

        let mut decoder: Decoder = Decoder::new().with_max_payload(self.config.max_payload_size);
        let mut buf = vec![0u8; self.config.read_buffer_size];

        let outcome = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("read_loop: transport closed");
                    break Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("read_loop: read failed: {}", e);
                    break Err(ClientError::Io(e));
                }
            };

            decoder.extend(&buf[..n]);
            if let Err(e) = self.dispatch(&mut decoder) {
                tracing::warn!("read_loop: stream desynchronized: {}", e);
                break Err(e);
            }
        };

        self.shutdown_pending();
        outcome
    }

    /// Resolves every complete frame in the decoder.
    fn dispatch(&self, decoder: &mut Decoder) -> Result<(), ClientError> {
        loop {
            match decoder.decode_frame() {
                Ok(Some(frame)) => {
                    let id = frame.correlation_id;
                    self.resolve(id, Ok(frame));
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    if let ProtocolError::ChecksumMismatch { correlation_id, .. } = &e {
                        self.resolve(*correlation_id, Err(e.clone()));
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn resolve(&self, id: CorrelationId, outcome: Result<ResponseFrame, ProtocolError>) {
        let resolver = lock_pending(&self.pending).remove(&id);
        match resolver {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => tracing::debug!("read_loop: no pending request for id={}", id),
        }
    }

    /// Marks the session closed and fails every waiting request.
    fn shutdown_pending(&self) {
        let mut pending = lock_pending(&self.pending);
        self.connected.store(false, Ordering::SeqCst);
        if !pending.is_empty() {
            tracing::debug!("Failing {} pending requests", pending.len());
        }
        // Dropping the senders wakes each receiver with an error.
        pending.clear();
    }

    /// Returns whether the session still accepts requests.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    ///
    /// Shuts down the writer and fails pending requests. A reader already
    /// running in `read_loop` stops when the transport reports end of stream
    /// or when its task is aborted.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");

        if let Some(mut writer) = self.writer.lock().await.take() {
            tracing::debug!("Shutting down writer");
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();

        self.shutdown_pending();
        tracing::debug!("Connection closed");
        Ok(())
    }

    /// Returns the number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Returns the number of writes waiting for or holding the writer.
    pub fn queued_writes(&self) -> usize {
        self.queued_writes.load(Ordering::SeqCst)
    }
}

//! Per-connection shared write half.
//!
//! Every byte sent to a client goes through its SharedWriter: the handler's
//! own acknowledgements and frames forwarded by other connections' handlers.
//! Closing is signalled before the write mutex is taken: a write checks the
//! signal under the mutex before it starts and abandons an in-flight write
//! when the signal fires, so a peer that stopped reading cannot hold up a
//! close.

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use super::ConnectionId;
use crate::codec::Encoder;
use crate::protocol::{EncodeError, Packet};

type BoxedWrite = Pin<Box<dyn AsyncWrite + Send>>;

/// Upper bound on shutting down the write side once closed
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Error when sending to a SharedWriter
#[derive(Debug)]
pub enum SendError {
    /// Connection is closed
    Closed,
    /// Socket write failed
    Io(std::io::Error),
    /// Encoding error
    Encode(EncodeError),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed => write!(f, "connection closed"),
            SendError::Io(e) => write!(f, "IO error: {}", e),
            SendError::Encode(e) => write!(f, "Encode error: {}", e),
        }
    }
}

impl std::error::Error for SendError {}

impl From<std::io::Error> for SendError {
    fn from(e: std::io::Error) -> Self {
        SendError::Io(e)
    }
}

impl From<EncodeError> for SendError {
    fn from(e: EncodeError) -> Self {
        SendError::Encode(e)
    }
}

/// Write side of one registered connection
pub struct SharedWriter {
    id: ConnectionId,
    client_id: Arc<str>,
    addr: SocketAddr,
    stream: Mutex<BoxedWrite>,
    /// `true` once the connection no longer accepts writes
    closed: watch::Sender<bool>,
}

impl SharedWriter {
    pub fn new<W>(id: ConnectionId, client_id: Arc<str>, addr: SocketAddr, stream: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            client_id,
            addr,
            stream: Mutex::new(Box::pin(stream)),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn client_id(&self) -> &Arc<str> {
        &self.client_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_alive(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Write pre-serialized bytes and flush.
    ///
    /// Fails with [`SendError::Closed`] if the writer is closed before or
    /// while the bytes are written.
    pub async fn send_bytes(&self, data: &[u8]) -> Result<(), SendError> {
        let mut closed = self.closed.subscribe();
        let mut stream = self.stream.lock().await;
        if !self.is_alive() {
            return Err(SendError::Closed);
        }

        tokio::select! {
            result = async {
                stream.write_all(data).await?;
                stream.flush().await
            } => Ok(result?),
            _ = closed.wait_for(|closed| *closed) => Err(SendError::Closed),
        }
    }

    /// Encode and write one packet
    pub async fn send_packet(&self, packet: &Packet) -> Result<(), SendError> {
        let mut buf = BytesMut::with_capacity(64);
        Encoder::new().encode(packet, &mut buf)?;
        self.send_bytes(&buf).await
    }

    /// Stop accepting writes and wake the owning handler without touching
    /// the socket. Returns `false` if the writer was already closed.
    pub fn mark_closed(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Mark the writer closed, then shut the socket's write side down.
    /// Idempotent.
    pub async fn close(&self) {
        self.mark_closed();

        // Any write holding the mutex has been told to give up
        let shutdown = async {
            let mut stream = self.stream.lock().await;
            stream.shutdown().await
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Shutdown of {} failed: {}", self.addr, e),
            Err(_) => debug!("Shutdown of {} timed out", self.addr),
        }
    }

    /// Resolves once the writer has been closed
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriter")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("addr", &self.addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PubAck;
    use tokio::io::AsyncReadExt;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:1883".parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_packet_writes_encoded_bytes() {
        let (client, mut server) = tokio::io::duplex(64);
        let writer = SharedWriter::new(1, "c".into(), test_addr(), client);

        writer
            .send_packet(&Packet::PubAck(PubAck { packet_id: 5 }))
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x40, 0x02, 0x00, 0x05]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, mut server) = tokio::io::duplex(64);
        let writer = SharedWriter::new(1, "c".into(), test_addr(), client);

        writer.close().await;
        assert!(!writer.is_alive());
        assert!(matches!(
            writer.send_bytes(&[0xD0, 0x00]).await,
            Err(SendError::Closed)
        ));

        // Write side was shut down: peer sees EOF
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (client, _server) = tokio::io::duplex(64);
        let writer = Arc::new(SharedWriter::new(1, "c".into(), test_addr(), client));

        let waiter = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.closed().await })
        };
        writer.close().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already closed: returns immediately
        writer.closed().await;
    }

    #[tokio::test]
    async fn test_close_abandons_stalled_write() {
        // Peer never reads, so the write fills the pipe and blocks
        let (client, _server) = tokio::io::duplex(8);
        let writer = Arc::new(SharedWriter::new(1, "c".into(), test_addr(), client));

        let stalled = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.send_bytes(&[0u8; 1024]).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!stalled.is_finished());

        tokio::time::timeout(std::time::Duration::from_secs(1), writer.close())
            .await
            .expect("close blocked behind a stalled write");
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), stalled)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn test_mark_closed_reports_first_call() {
        let (client, _server) = tokio::io::duplex(64);
        let writer = SharedWriter::new(1, "c".into(), test_addr(), client);
        assert!(writer.mark_closed());
        assert!(!writer.mark_closed());
        assert!(!writer.is_alive());
        writer.closed().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let writer = SharedWriter::new(1, "c".into(), test_addr(), client);
        writer.close().await;
        writer.close().await;
        assert!(!writer.is_alive());
    }
}

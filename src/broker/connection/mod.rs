//! MQTT Connection Handler
//!
//! Drives one client connection through its state machine:
//! `AwaitConnect -> Ready -> Closed`. The read half is owned by the handler;
//! the write half moves into a [`SharedWriter`] at CONNECT so that other
//! handlers can forward to it.

mod connect;
mod disconnect;
mod publish;
mod subscribe;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::broker::{BrokerEvent, ConnectionId, MessageRouter, Registry, SendError, SharedWriter};
use crate::codec::{Decoder, PacketReader, ReadError};
use crate::protocol::{DecodeError, Packet, ProtocolError};

/// Connection error types
#[derive(Debug)]
pub enum ConnectionError {
    Io(std::io::Error),
    Protocol(ProtocolError),
    Decode(DecodeError),
    /// Normal termination: DISCONNECT, or the broker closed the connection
    Shutdown,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "IO error: {}", e),
            ConnectionError::Protocol(e) => write!(f, "Protocol error: {}", e),
            ConnectionError::Decode(e) => write!(f, "Decode error: {}", e),
            ConnectionError::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<DecodeError> for ConnectionError {
    fn from(e: DecodeError) -> Self {
        ConnectionError::Decode(e)
    }
}

impl From<ReadError> for ConnectionError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => ConnectionError::Io(e),
            ReadError::Decode(e) => ConnectionError::Decode(e),
        }
    }
}

impl From<SendError> for ConnectionError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Closed => ConnectionError::Shutdown,
            SendError::Io(e) => ConnectionError::Io(e),
            SendError::Encode(e) => ConnectionError::Protocol(e.into()),
        }
    }
}

/// Connection state
pub(crate) enum State {
    /// Waiting for CONNECT packet
    AwaitConnect,
    /// Registered and dispatching packets
    Ready { writer: Arc<SharedWriter> },
    /// Terminal; cleanup has run
    Closed,
}

/// Connection handler - generic over the stream type
pub struct Connection<S> {
    pub(crate) id: ConnectionId,
    pub(crate) addr: SocketAddr,
    pub(crate) state: State,
    pub(crate) reader: PacketReader<BufReader<ReadHalf<S>>>,
    /// Write half until CONNECT hands it to the SharedWriter
    pub(crate) write_half: Option<WriteHalf<S>>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) events: broadcast::Sender<BrokerEvent>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        id: ConnectionId,
        registry: Arc<Registry>,
        router: Arc<MessageRouter>,
        events: broadcast::Sender<BrokerEvent>,
        max_packet_size: usize,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let decoder = Decoder::new().with_max_packet_size(max_packet_size);
        Self {
            id,
            addr,
            state: State::AwaitConnect,
            reader: PacketReader::with_decoder(BufReader::new(read_half), decoder),
            write_half: Some(write_half),
            registry,
            router,
            events,
        }
    }

    /// Run the connection to completion. Cleanup always runs before this
    /// returns, whatever ended the connection.
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        let result = self.serve().await;
        self.handle_disconnect().await;
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        if !self.read_connect().await? {
            return Ok(());
        }
        self.run_connected().await
    }

    /// Run the main connection loop
    async fn run_connected(&mut self) -> Result<(), ConnectionError> {
        let writer = match &self.state {
            State::Ready { writer } => writer.clone(),
            _ => {
                return Err(ConnectionError::Protocol(ProtocolError::ProtocolViolation(
                    "not connected",
                )))
            }
        };

        loop {
            let packet = tokio::select! {
                biased;

                _ = writer.closed() => {
                    debug!("Connection {} closed by broker", writer.client_id());
                    return Err(ConnectionError::Shutdown);
                }
                result = self.reader.read_packet() => result?,
            };

            let Some(packet) = packet else {
                debug!("Connection closed from {}", self.addr);
                return Ok(());
            };

            self.handle_packet(&writer, packet).await?;
        }
    }

    /// Handle an incoming packet
    async fn handle_packet(
        &mut self,
        writer: &Arc<SharedWriter>,
        packet: Packet,
    ) -> Result<(), ConnectionError> {
        trace!("{:?} from {}", packet.packet_type(), writer.client_id());
        match packet {
            Packet::Publish(publish) => self.handle_publish(writer, publish).await,
            Packet::Subscribe(subscribe) => self.handle_subscribe(writer, subscribe).await,
            Packet::PingReq => {
                writer.send_packet(&Packet::PingResp).await?;
                Ok(())
            }
            Packet::Disconnect => {
                debug!("DISCONNECT from {}", writer.client_id());
                Err(ConnectionError::Shutdown)
            }
            // Acknowledges a QoS 1 frame forwarded to this client
            Packet::PubAck(_) => Ok(()),
            other => {
                warn!(
                    "Unexpected packet type from {}: {:?}",
                    writer.client_id(),
                    other.packet_type()
                );
                Err(ConnectionError::Protocol(ProtocolError::UnexpectedPacket(
                    other.packet_type(),
                )))
            }
        }
    }
}

//! Minimal MQTT v3.1.1 client
//!
//! Speaks the same packet subset as the broker. Used by the
//! `reactor-client` binary and by the integration tests.
//!
//! A background task reads packets from the socket into a channel, so
//! [`Client::recv`] can be cancelled (e.g. wrapped in a timeout) without
//! losing frames.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::codec::{Encoder, PacketReader, ReadError};
use crate::protocol::{
    Connect, DecodeError, EncodeError, Packet, PubAck, Publish, QoS, Subscribe, Subscription,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client error types
#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Decode(DecodeError),
    Encode(EncodeError),
    /// CONNACK carried a non-zero return code
    ConnectionRefused(u8),
    /// The broker closed the connection
    ConnectionClosed,
    /// No reply within the client's timeout
    Timeout,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Decode(e) => write!(f, "Decode error: {}", e),
            ClientError::Encode(e) => write!(f, "Encode error: {}", e),
            ClientError::ConnectionRefused(code) => {
                write!(f, "Connection refused (return code {})", code)
            }
            ClientError::ConnectionClosed => write!(f, "Connection closed"),
            ClientError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Encode(e)
    }
}

impl From<ReadError> for ClientError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => ClientError::Io(e),
            ReadError::Decode(e) => ClientError::Decode(e),
        }
    }
}

/// A connected MQTT client
pub struct Client {
    client_id: String,
    writer: OwnedWriteHalf,
    encoder: Encoder,
    incoming: mpsc::Receiver<Result<Packet, ReadError>>,
    reader_task: JoinHandle<()>,
    /// PUBLISH packets that arrived while waiting for an acknowledgement
    pending: VecDeque<Publish>,
    next_packet_id: u16,
    timeout: Duration,
}

impl Client {
    /// Connect to a broker and complete the CONNECT/CONNACK exchange
    pub async fn connect<A: ToSocketAddrs>(addr: A, client_id: &str) -> Result<Self, ClientError> {
        Self::connect_with(addr, Connect::new(client_id)).await
    }

    /// Connect with a caller-built CONNECT packet
    pub async fn connect_with<A: ToSocketAddrs>(
        addr: A,
        connect: Connect,
    ) -> Result<Self, ClientError> {
        let stream = timeout(DEFAULT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();

        let (tx, incoming) = mpsc::channel(256);
        let reader_task = tokio::spawn(async move {
            let mut reader = PacketReader::new(BufReader::new(read_half));
            loop {
                match reader.read_packet().await {
                    Ok(Some(packet)) => {
                        if tx.send(Ok(packet)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        let mut client = Self {
            client_id: connect.client_id.clone(),
            writer,
            encoder: Encoder::new(),
            incoming,
            reader_task,
            pending: VecDeque::new(),
            next_packet_id: 1,
            timeout: DEFAULT_TIMEOUT,
        };

        client.send(&Packet::Connect(connect)).await?;
        let return_code = client
            .await_packet(|packet| match packet {
                Packet::ConnAck(ack) => Some(ack.return_code),
                _ => None,
            })
            .await?;
        if return_code != 0 {
            return Err(ClientError::ConnectionRefused(return_code));
        }

        debug!("Client {} connected", client.client_id);
        Ok(client)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// How long to wait for CONNACK, SUBACK, PUBACK and PINGRESP
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Subscribe to filters, returning the granted QoS per filter in order
    pub async fn subscribe(&mut self, filters: &[(&str, QoS)]) -> Result<Vec<u8>, ClientError> {
        let packet_id = self.next_packet_id();
        let subscriptions = filters
            .iter()
            .map(|(filter, qos)| Subscription {
                filter: filter.to_string(),
                qos: *qos as u8,
            })
            .collect();

        self.send(&Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions,
        }))
        .await?;

        self.await_packet(|packet| match packet {
            Packet::SubAck(ack) if ack.packet_id == packet_id => Some(ack.return_codes.clone()),
            _ => None,
        })
        .await
    }

    /// Publish a message.
    ///
    /// QoS 1 waits for the matching PUBACK. QoS 2 is sent but not
    /// acknowledged by the broker, so nothing is awaited.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> Result<(), ClientError> {
        let mut publish = Publish::new(topic, payload);
        publish.qos = qos;
        if qos != QoS::AtMostOnce {
            publish.packet_id = Some(self.next_packet_id());
        }
        let packet_id = publish.packet_id;

        self.send(&Packet::Publish(publish)).await?;

        if let (QoS::AtLeastOnce, Some(packet_id)) = (qos, packet_id) {
            self.await_packet(|packet| match packet {
                Packet::PubAck(ack) if ack.packet_id == packet_id => Some(()),
                _ => None,
            })
            .await?;
        }
        Ok(())
    }

    /// Next message delivered by the broker, or `None` once the connection
    /// is closed. Waits indefinitely.
    pub async fn recv(&mut self) -> Result<Option<Publish>, ClientError> {
        if let Some(publish) = self.pending.pop_front() {
            return Ok(Some(publish));
        }
        loop {
            let packet = match self.next_packet().await {
                Ok(packet) => packet,
                Err(ClientError::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e),
            };
            match packet {
                Packet::Publish(publish) => {
                    self.acknowledge(&publish).await?;
                    return Ok(Some(publish));
                }
                other => trace!("Ignoring {:?} while waiting for PUBLISH", other.packet_type()),
            }
        }
    }

    /// Round-trip a PINGREQ
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send(&Packet::PingReq).await?;
        self.await_packet(|packet| matches!(packet, Packet::PingResp).then_some(()))
            .await
    }

    /// Send DISCONNECT and close the connection
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&Packet::Disconnect).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        let mut buf = BytesMut::with_capacity(64);
        self.encoder.encode(packet, &mut buf)?;
        self.writer.write_all(&buf).await?;
        Ok(())
    }

    async fn next_packet(&mut self) -> Result<Packet, ClientError> {
        match self.incoming.recv().await {
            Some(result) => Ok(result?),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// PUBACK a QoS 1 delivery
    async fn acknowledge(&mut self, publish: &Publish) -> Result<(), ClientError> {
        if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
            self.send(&Packet::PubAck(PubAck { packet_id })).await?;
        }
        Ok(())
    }

    /// Wait for the first packet `want` accepts, queueing deliveries that
    /// arrive in the meantime
    async fn await_packet<T>(
        &mut self,
        want: impl FnMut(&Packet) -> Option<T>,
    ) -> Result<T, ClientError> {
        let limit = self.timeout;
        timeout(limit, self.wait_for(want))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn wait_for<T>(
        &mut self,
        mut want: impl FnMut(&Packet) -> Option<T>,
    ) -> Result<T, ClientError> {
        loop {
            match self.next_packet().await? {
                Packet::Publish(publish) => {
                    self.acknowledge(&publish).await?;
                    self.pending.push_back(publish);
                }
                other => match want(&other) {
                    Some(value) => return Ok(value),
                    None => trace!("Ignoring unexpected {:?}", other.packet_type()),
                },
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Accepts one connection, reads the CONNECT and answers with `connack`
    async fn fake_broker(connack: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut reader = PacketReader::new(&mut stream);
            let _ = reader.read_packet().await;
            stream.write_all(connack).await.unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let addr = fake_broker(&[0x20, 0x02, 0x00, 0x05]).await;
        match Client::connect(addr, "c").await {
            Err(ClientError::ConnectionRefused(5)) => {}
            other => panic!("expected refusal, got {:?}", other.map(|c| c.client_id().to_string())),
        }
    }

    #[tokio::test]
    async fn test_connect_accepted() {
        let addr = fake_broker(&[0x20, 0x02, 0x00, 0x00]).await;
        let client = Client::connect(addr, "core").await.unwrap();
        assert_eq!(client.client_id(), "core");
    }

    #[tokio::test]
    async fn test_ping_timeout() {
        let addr = fake_broker(&[0x20, 0x02, 0x00, 0x00]).await;
        let mut client = Client::connect(addr, "c").await.unwrap();
        client.set_timeout(Duration::from_millis(100));
        assert!(matches!(client.ping().await, Err(ClientError::Timeout)));
    }

    #[tokio::test]
    async fn test_packet_ids_skip_zero() {
        let addr = fake_broker(&[0x20, 0x02, 0x00, 0x00]).await;
        let mut client = Client::connect(addr, "c").await.unwrap();
        client.next_packet_id = u16::MAX;
        assert_eq!(client.next_packet_id(), u16::MAX);
        assert_eq!(client.next_packet_id(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_ends_recv() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = PacketReader::new(&mut stream).read_packet().await;
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            // Dropping the stream closes the connection
        });

        let mut client = Client::connect(addr, "c").await.unwrap();
        assert!(client.recv().await.unwrap().is_none());
    }
}

//! CONNECT packet handling

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::{Connection, ConnectionError, State};
use crate::broker::{BrokerEvent, SharedWriter};
use crate::protocol::{ConnAck, Connect, Packet, ProtocolError};

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Read the first packet, which must be CONNECT.
    ///
    /// Returns `Ok(false)` if the peer closed the stream before sending
    /// anything.
    pub(crate) async fn read_connect(&mut self) -> Result<bool, ConnectionError> {
        match self.reader.read_packet().await? {
            Some(Packet::Connect(connect)) => {
                self.handle_connect(connect).await?;
                Ok(true)
            }
            Some(other) => {
                // Protocol violation - first packet must be CONNECT
                debug!(
                    "First packet from {} was {:?}, not CONNECT",
                    self.addr,
                    other.packet_type()
                );
                Err(ConnectionError::Protocol(ProtocolError::ProtocolViolation(
                    "first packet must be CONNECT",
                )))
            }
            None => {
                debug!("Connection from {} closed before CONNECT", self.addr);
                Ok(false)
            }
        }
    }

    /// Register the connection and accept it.
    ///
    /// Protocol name, level, flags and keep alive are parsed but not
    /// checked; every CONNECT is accepted. Client identifiers need not be
    /// unique.
    async fn handle_connect(&mut self, connect: Connect) -> Result<(), ConnectionError> {
        let write_half = self.write_half.take().ok_or(ConnectionError::Protocol(
            ProtocolError::ProtocolViolation("duplicate CONNECT"),
        ))?;

        let client_id: Arc<str> = connect.client_id.into();
        let writer = Arc::new(SharedWriter::new(
            self.id,
            client_id.clone(),
            self.addr,
            write_half,
        ));

        self.registry.register(writer.clone());
        self.state = State::Ready {
            writer: writer.clone(),
        };

        writer
            .send_packet(&Packet::ConnAck(ConnAck::default()))
            .await?;

        info!(
            "Client {} connected from {} ({} v{}, keep alive {}s)",
            client_id, self.addr, connect.protocol_name, connect.protocol_level, connect.keep_alive
        );
        let _ = self.events.send(BrokerEvent::ClientConnected {
            client_id,
            addr: self.addr,
        });

        Ok(())
    }
}

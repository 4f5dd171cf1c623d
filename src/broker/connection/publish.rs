//! PUBLISH packet handling

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use super::{Connection, ConnectionError};
use crate::broker::{BrokerEvent, SharedWriter};
use crate::protocol::{Packet, PubAck, Publish, QoS};

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Forward to matching subscribers, then acknowledge QoS 1.
    ///
    /// QoS 2 is forwarded but never acknowledged.
    pub(crate) async fn handle_publish(
        &mut self,
        writer: &Arc<SharedWriter>,
        publish: Publish,
    ) -> Result<(), ConnectionError> {
        let receivers = self
            .router
            .forward(&publish)
            .await
            .map_err(|e| ConnectionError::Protocol(e.into()))?;

        trace!(
            "PUBLISH {} from {} ({} bytes, {:?}) -> {} subscribers",
            publish.topic,
            writer.client_id(),
            publish.payload.len(),
            publish.qos,
            receivers
        );

        if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
            writer
                .send_packet(&Packet::PubAck(PubAck { packet_id }))
                .await?;
        }

        let _ = self.events.send(BrokerEvent::MessagePublished {
            topic: publish.topic,
            qos: publish.qos,
            receivers,
        });

        Ok(())
    }
}

//! SUBSCRIBE packet handling

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{Connection, ConnectionError};
use crate::broker::SharedWriter;
use crate::protocol::{Packet, SubAck, Subscribe};

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Handle SUBSCRIBE packet
    ///
    /// Every filter is registered before the SUBACK goes out, so a publish
    /// sent after the client sees the SUBACK is routed to it.
    pub(crate) async fn handle_subscribe(
        &mut self,
        writer: &Arc<SharedWriter>,
        subscribe: Subscribe,
    ) -> Result<(), ConnectionError> {
        let return_codes: Vec<u8> = subscribe
            .subscriptions
            .iter()
            .map(|sub| self.registry.subscribe(self.id, &sub.filter, sub.qos))
            .collect();

        debug!(
            "Client {} subscribed to {:?}",
            writer.client_id(),
            subscribe
                .subscriptions
                .iter()
                .map(|s| s.filter.as_str())
                .collect::<Vec<_>>()
        );

        writer
            .send_packet(&Packet::SubAck(SubAck {
                packet_id: subscribe.packet_id,
                return_codes,
            }))
            .await?;

        Ok(())
    }
}

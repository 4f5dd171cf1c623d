//! Connection cleanup

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use super::{Connection, State};
use crate::broker::BrokerEvent;

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Move to `Closed`, running cleanup exactly once.
    ///
    /// The writer is marked closed before the registry entry is removed, so
    /// a forward that snapshotted this connection finds it dead instead of
    /// writing after cleanup began. The socket is shut down last; that may
    /// wait on a write to a peer that stopped reading.
    pub(crate) async fn handle_disconnect(&mut self) {
        let State::Ready { writer } = std::mem::replace(&mut self.state, State::Closed) else {
            return;
        };

        writer.mark_closed();

        if self.registry.unsubscribe_all(self.id).is_some() {
            info!("Client {} disconnected ({})", writer.client_id(), writer.addr());
            let _ = self.events.send(BrokerEvent::ClientDisconnected {
                client_id: writer.client_id().clone(),
            });
        }

        writer.close().await;
    }
}

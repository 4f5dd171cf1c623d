//! Message Router
//!
//! Fans a PUBLISH out to every matching subscriber.

use std::sync::Arc;

use bytes::BytesMut;
use tracing::debug;

use super::Registry;
use crate::codec::Encoder;
use crate::protocol::{EncodeError, Publish};

/// Message router for distributing messages to subscribers
pub struct MessageRouter {
    registry: Arc<Registry>,
    encoder: Encoder,
}

impl MessageRouter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            encoder: Encoder::new(),
        }
    }

    /// Forward `publish` to every connection subscribed under a matching
    /// filter, returning how many writes succeeded.
    ///
    /// The frame is encoded once with the publisher's flags. The match set
    /// is snapshotted under the registry lock; writes happen after it is
    /// released. A failed write only affects that subscriber.
    pub async fn forward(&self, publish: &Publish) -> Result<usize, EncodeError> {
        let mut buf = BytesMut::with_capacity(publish.payload.len() + publish.topic.len() + 8);
        self.encoder.encode_publish(publish, &mut buf)?;
        let frame = buf.freeze();

        let targets = self.registry.matching(&publish.topic);
        let mut delivered = 0;
        for writer in targets {
            match writer.send_bytes(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(
                        "Dropping delivery of {} to {}: {}",
                        publish.topic,
                        writer.client_id(),
                        e
                    );
                }
            }
        }
        Ok(delivered)
    }
}

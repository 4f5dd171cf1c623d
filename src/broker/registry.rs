//! Connection table and subscription registry
//!
//! Both live behind one lock: subscribe, connection cleanup and the
//! matching snapshot taken for every publish are each a single critical
//! section.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::{ConnectionId, SharedWriter};
use crate::topic::SubscriptionStore;

/// Writers matched by one publish
pub type Matches = SmallVec<[Arc<SharedWriter>; 16]>;

#[derive(Default)]
struct Inner {
    connections: AHashMap<ConnectionId, Arc<SharedWriter>>,
    subscriptions: SubscriptionStore,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the table
    pub fn register(&self, writer: Arc<SharedWriter>) {
        self.inner.write().connections.insert(writer.id(), writer);
    }

    /// Subscribe a connection to `filter`, returning the granted QoS.
    ///
    /// The requested QoS is always granted. A connection that is no longer
    /// in the table (cleanup already ran) gets its grant but no entry.
    pub fn subscribe(&self, connection: ConnectionId, filter: &str, qos: u8) -> u8 {
        let mut inner = self.inner.write();
        if !inner.connections.contains_key(&connection) {
            return qos;
        }
        inner.subscriptions.subscribe(filter, connection, qos)
    }

    /// Drop every subscription of `connection` and remove it from the table.
    ///
    /// Returns the removed writer, or `None` if cleanup already happened.
    pub fn unsubscribe_all(&self, connection: ConnectionId) -> Option<Arc<SharedWriter>> {
        let mut inner = self.inner.write();
        inner.subscriptions.unsubscribe_all(connection);
        inner.connections.remove(&connection)
    }

    /// Snapshot of live writers subscribed to any filter matching `topic`
    pub fn matching(&self, topic: &str) -> Matches {
        let inner = self.inner.read();
        inner
            .subscriptions
            .matches(topic)
            .into_iter()
            .filter_map(|id| inner.connections.get(&id))
            .filter(|writer| writer.is_alive())
            .cloned()
            .collect()
    }

    /// All registered writers using `client_id`
    pub fn find_by_client_id(&self, client_id: &str) -> Vec<Arc<SharedWriter>> {
        self.inner
            .read()
            .connections
            .values()
            .filter(|writer| &**writer.client_id() == client_id)
            .cloned()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Total (filter, connection) pairs
    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions.len()
    }
}

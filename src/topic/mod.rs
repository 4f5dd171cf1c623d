//! Topic matching and subscription bookkeeping
//!
//! Subscriptions are kept per exact filter string. Routing a publish is
//! computed by running the matcher over every registered filter, so there
//! is no index to keep consistent with wildcard semantics.

mod matcher;

pub use matcher::topic_matches_filter;

use ahash::{AHashMap, AHashSet};

use crate::broker::ConnectionId;

/// Filter -> subscribed connections, with the QoS granted to each
///
/// Not synchronized; the broker wraps it together with the connection
/// table in a single lock.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    filters: AHashMap<String, AHashMap<ConnectionId, u8>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a subscription, returning the granted QoS
    pub fn subscribe(&mut self, filter: &str, connection: ConnectionId, qos: u8) -> u8 {
        self.filters
            .entry(filter.to_string())
            .or_default()
            .insert(connection, qos);
        qos
    }

    /// Remove a connection from every filter, returning how many it held
    pub fn unsubscribe_all(&mut self, connection: ConnectionId) -> usize {
        let mut removed = 0;
        self.filters.retain(|_, subscribers| {
            if subscribers.remove(&connection).is_some() {
                removed += 1;
            }
            !subscribers.is_empty()
        });
        removed
    }

    /// Union of the connections subscribed under any filter matching `topic`
    pub fn matches(&self, topic: &str) -> AHashSet<ConnectionId> {
        let mut result = AHashSet::new();
        for (filter, subscribers) in &self.filters {
            if topic_matches_filter(topic, filter) {
                result.extend(subscribers.keys().copied());
            }
        }
        result
    }

    /// Total (filter, connection) pairs
    pub fn len(&self) -> usize {
        self.filters.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

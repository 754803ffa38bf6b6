//! Subscriber registry
//!
//! The registry is the only owner of subscriber records and of the
//! topic -> subscriptions index. Subscribers are created on their first
//! IDENTIFY and kept for the life of the process; a disconnect only clears
//! the connection bound to them.
//!
//! A reverse `ConnectionId -> ClientId` index makes disconnect handling a
//! single lookup instead of a scan over every subscriber.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::broker::topic::{ResubscribePolicy, Subscription, Topic};
use crate::client::{Client, ConnectionId};
use crate::transport::frame::ClientId;

#[derive(Debug)]
pub struct Subscriber {
    pub id: ClientId,
    /// Bound connection; `None` while the subscriber is offline.
    pub connection: Option<Client>,
}

impl Subscriber {
    pub fn is_live(&self) -> bool {
        self.connection.is_some()
    }
}

/// How an IDENTIFY was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time this id has been seen.
    New,
    /// A known, offline subscriber came back and is now bound to the offered
    /// connection.
    Returning,
    /// The id is already bound to a live connection. Nothing changed; the
    /// offered connection must be closed.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) subscribers: HashMap<ClientId, Subscriber>,
    pub(crate) connections: HashMap<ConnectionId, ClientId>,
    pub(crate) topics: HashMap<String, Topic>,
    resubscribe: ResubscribePolicy,
}

impl Registry {
    pub fn new(resubscribe: ResubscribePolicy) -> Self {
        Self {
            resubscribe,
            ..Self::default()
        }
    }

    pub fn on_identify(&mut self, id: ClientId, client: Client) -> Registration {
        let connection = client.id;

        let registration = match self.subscribers.entry(id.clone()) {
            Entry::Occupied(entry) if entry.get().is_live() => return Registration::Duplicate,
            Entry::Occupied(mut entry) => {
                entry.get_mut().connection = Some(client);
                Registration::Returning
            }
            Entry::Vacant(entry) => {
                entry.insert(Subscriber {
                    id: id.clone(),
                    connection: Some(client),
                });
                Registration::New
            }
        };

        self.connections.insert(connection, id);
        registration
    }

    /// Mark the subscriber bound to `connection` offline. Returns its id, or
    /// `None` if the connection never completed IDENTIFY or was already
    /// released.
    pub fn on_disconnect(&mut self, connection: ConnectionId) -> Option<ClientId> {
        let id = self.connections.remove(&connection)?;
        if let Some(subscriber) = self.subscribers.get_mut(&id) {
            // only clear the binding if it still points at this connection
            if subscriber
                .connection
                .as_ref()
                .is_some_and(|c| c.id == connection)
            {
                subscriber.connection = None;
            }
        }
        Some(id)
    }

    /// Mark `id` offline regardless of which connection it holds.
    pub fn mark_offline(&mut self, id: &ClientId) {
        if let Some(client) = self
            .subscribers
            .get_mut(id)
            .and_then(|s| s.connection.take())
        {
            self.connections.remove(&client.id);
        }
    }

    /// Returns `true` if an existing subscription was updated in place.
    pub fn on_subscribe(&mut self, id: &ClientId, topic: &str, store_and_forward: bool) -> bool {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id.clone(), store_and_forward, self.resubscribe)
    }

    /// Returns `true` if a subscription was removed.
    pub fn on_unsubscribe(&mut self, id: &ClientId, topic: &str) -> bool {
        self.topics
            .get_mut(topic)
            .is_some_and(|t| t.unsubscribe(id))
    }

    pub fn subscriber(&self, id: &ClientId) -> Option<&Subscriber> {
        self.subscribers.get(id)
    }

    /// Live connection bound to `id`, if any.
    pub fn connection(&self, id: &ClientId) -> Option<&Client> {
        self.subscribers.get(id).and_then(|s| s.connection.as_ref())
    }

    /// Client id bound to `connection`, if it is live.
    pub fn client_for(&self, connection: ConnectionId) -> Option<&ClientId> {
        self.connections.get(&connection)
    }

    /// Subscriptions for `topic`; an unknown topic has none.
    pub fn subscriptions(&self, topic: &str) -> &[Subscription] {
        self.topics
            .get(topic)
            .map(|t| t.subscriptions.as_slice())
            .unwrap_or(&[])
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    pub fn live_count(&self) -> usize {
        self.connections.len()
    }

    /// Drop every live connection handle. Used on shutdown.
    pub fn release_all(&mut self) -> usize {
        let released = self.connections.len();
        self.connections.clear();
        for subscriber in self.subscribers.values_mut() {
            subscriber.connection = None;
        }
        released
    }
}

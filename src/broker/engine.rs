//! Broker engine
//!
//! `Broker` bundles the subscriber registry and the store-and-forward queues
//! into the single piece of state the dispatcher owns. Every method takes
//! `&mut self` and none of them block: delivery pushes encoded frames into
//! each connection's outbound channel, and the connection task does the
//! socket write.
//!
//! Ordering notes:
//! - Per subscriber, frames enter its channel in publish order, whether they
//!   come from a live fan-out or from a replayed queue.
//! - A returning subscriber's queue is pushed into its new channel inside
//!   `identify`, so it is ahead of anything published afterwards.

use tracing::{debug, warn};

use crate::broker::message::Message;
use crate::broker::queue::{Enqueued, OverflowPolicy, PendingQueues};
use crate::broker::registry::{Registration, Registry};
use crate::broker::topic::ResubscribePolicy;
use crate::client::{Client, ConnectionId};
use crate::config::BrokerSettings;
use crate::transport::frame::{ClientId, Frame, encode_publish};

/// Result of an IDENTIFY handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyOutcome {
    /// A new subscriber was registered.
    Accepted,
    /// A known subscriber reconnected; `replayed` queued frames were handed
    /// to the new connection.
    Reconnected { replayed: usize },
    /// The id is already live. The offered connection must be closed.
    Rejected,
}

impl IdentifyOutcome {
    pub fn is_accepted(self) -> bool {
        !matches!(self, IdentifyOutcome::Rejected)
    }
}

/// What a single publish did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Frames handed to live connections.
    pub delivered: usize,
    /// Frames stored for offline store-and-forward subscribers.
    pub queued: usize,
    /// Frames lost: offline without store-and-forward, or evicted/rejected by
    /// a full queue.
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Broker {
    pub(crate) registry: Registry,
    pub(crate) pending: PendingQueues,
}

impl Broker {
    /// Broker with unbounded queues and in-place re-subscription.
    pub fn new() -> Self {
        Self::with_policies(ResubscribePolicy::default(), 0, OverflowPolicy::default())
    }

    pub fn with_settings(settings: &BrokerSettings) -> Self {
        Self::with_policies(
            settings.resubscribe,
            settings.max_pending_per_subscriber,
            settings.overflow,
        )
    }

    pub fn with_policies(
        resubscribe: ResubscribePolicy,
        max_pending_per_subscriber: usize,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            registry: Registry::new(resubscribe),
            pending: PendingQueues::new(max_pending_per_subscriber, overflow),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingQueues {
        &self.pending
    }

    /// Bind `client_id` to `client`.
    ///
    /// A returning subscriber gets its whole queue, oldest first, before this
    /// returns. If the connection dies part way through, the undelivered tail
    /// goes back to the head of the queue and the subscriber is offline
    /// again.
    pub fn identify(&mut self, client_id: ClientId, client: Client) -> IdentifyOutcome {
        let handle = client.clone();

        match self.registry.on_identify(client_id.clone(), client) {
            Registration::New => {
                debug!(client = %client_id, connection = %handle.id, "Registered new client");
                IdentifyOutcome::Accepted
            }
            Registration::Duplicate => {
                debug!(client = %client_id, "Rejected duplicate connection");
                IdentifyOutcome::Rejected
            }
            Registration::Returning => {
                let mut frames = self.pending.drain(&client_id);
                let mut replayed = 0;

                while let Some(frame) = frames.pop_front() {
                    match handle.send(frame) {
                        Ok(()) => replayed += 1,
                        Err(frame) => {
                            frames.push_front(frame);
                            warn!(
                                client = %client_id,
                                undelivered = frames.len(),
                                "Connection closed during replay"
                            );
                            self.pending.requeue_front(&client_id, frames);
                            self.registry.mark_offline(&client_id);
                            break;
                        }
                    }
                }

                debug!(client = %client_id, replayed, "Rebound returning client");
                IdentifyOutcome::Reconnected { replayed }
            }
        }
    }

    /// Release whatever subscriber is bound to `connection`.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<ClientId> {
        let client_id = self.registry.on_disconnect(connection)?;
        debug!(client = %client_id, %connection, "Released connection");
        Some(client_id)
    }

    /// Apply a frame received on an identified connection.
    ///
    /// The subscriber is taken from the connection binding, not from the id
    /// field of the frame.
    pub fn handle_frame(&mut self, connection: ConnectionId, frame: Frame) {
        let Some(client_id) = self.registry.client_for(connection).cloned() else {
            warn!(%connection, "Frame from a connection with no identified client");
            return;
        };

        match frame {
            Frame::Subscribe {
                client_id: claimed,
                topic,
                store_and_forward,
            } => {
                check_claimed(&client_id, &claimed);
                self.subscribe(&client_id, &topic, store_and_forward);
            }
            Frame::Unsubscribe {
                client_id: claimed,
                topic,
            } => {
                check_claimed(&client_id, &claimed);
                self.unsubscribe(&client_id, &topic);
            }
            Frame::Identify { .. } => {
                warn!(client = %client_id, "Ignoring repeated IDENTIFY");
            }
            Frame::Publish(_) => {
                warn!(client = %client_id, "Subscribers may not publish; frame ignored");
            }
        }
    }

    pub fn subscribe(&mut self, client_id: &ClientId, topic: &str, store_and_forward: bool) {
        let replaced = self.registry.on_subscribe(client_id, topic, store_and_forward);
        debug!(client = %client_id, topic, store_and_forward, replaced, "Subscribed");
    }

    pub fn unsubscribe(&mut self, client_id: &ClientId, topic: &str) {
        let removed = self.registry.on_unsubscribe(client_id, topic);
        debug!(client = %client_id, topic, removed, "Unsubscribed");
    }

    /// Fan `message` out to every subscription on its topic.
    ///
    /// The frame is encoded once and shared. Live subscribers get it
    /// directly, offline store-and-forward subscribers get a queued copy, and
    /// everyone else misses it. A live subscriber whose connection task has
    /// already exited is treated as offline from this point on.
    pub fn publish(&mut self, message: &Message) -> PublishReport {
        let mut report = PublishReport::default();

        let frame = match encode_publish(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Failed to encode publish frame");
                return report;
            }
        };

        let mut gone = Vec::new();

        for subscription in self.registry.subscriptions(&message.topic) {
            let subscriber = &subscription.subscriber;

            if let Some(client) = self.registry.connection(subscriber) {
                if client.send(frame.clone()).is_ok() {
                    report.delivered += 1;
                    continue;
                }
                gone.push(subscriber.clone());
            }

            if !subscription.store_and_forward {
                report.dropped += 1;
                continue;
            }

            match self.pending.enqueue(subscriber, frame.clone()) {
                Enqueued::Stored => report.queued += 1,
                Enqueued::DroppedOldest => {
                    report.queued += 1;
                    report.dropped += 1;
                }
                Enqueued::Rejected => report.dropped += 1,
            }
        }

        for subscriber in gone {
            warn!(client = %subscriber, "Connection gone; marking client offline");
            self.registry.mark_offline(&subscriber);
        }

        debug!(
            topic = %message.topic,
            delivered = report.delivered,
            queued = report.queued,
            dropped = report.dropped,
            "Published"
        );
        report
    }

    /// Drop every live connection handle, closing each connection's outbound
    /// channel. Returns how many were live.
    pub fn shutdown(&mut self) -> usize {
        self.registry.release_all()
    }
}

fn check_claimed(bound: &ClientId, claimed: &ClientId) {
    if bound != claimed {
        warn!(client = %bound, claimed = %claimed, "Frame claims a different client id");
    }
}

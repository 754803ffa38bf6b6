//! Store-and-forward queues
//!
//! Frames published to a store-and-forward subscription while its subscriber
//! is offline wait here, per subscriber, in publish order. Each queue holds
//! value copies of the encoded frames (cheap `Bytes` clones), so nothing is
//! shared mutably between publish time and delivery time.
//!
//! Queues are bounded by `capacity` (0 means unbounded). What happens at the
//! bound is chosen by `OverflowPolicy`.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use serde::Deserialize;

use crate::transport::frame::ClientId;

/// What to do when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending frame to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the new frame.
    RejectNew,
}

/// Result of `PendingQueues::enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Stored,
    /// Stored after evicting the oldest frame.
    DroppedOldest,
    /// Not stored; the queue was full.
    Rejected,
}

#[derive(Debug, Default)]
pub struct PendingQueues {
    queues: HashMap<ClientId, VecDeque<Bytes>>,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl PendingQueues {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            queues: HashMap::new(),
            capacity,
            overflow,
        }
    }

    /// Queues without a bound, matching the legacy broker.
    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::default())
    }

    /// Append `frame` to the tail of `subscriber`'s queue.
    pub fn enqueue(&mut self, subscriber: &ClientId, frame: Bytes) -> Enqueued {
        let queue = self.queues.entry(subscriber.clone()).or_default();

        if self.capacity == 0 || queue.len() < self.capacity {
            queue.push_back(frame);
            return Enqueued::Stored;
        }

        match self.overflow {
            OverflowPolicy::DropOldest => {
                queue.pop_front();
                queue.push_back(frame);
                Enqueued::DroppedOldest
            }
            OverflowPolicy::RejectNew => Enqueued::Rejected,
        }
    }

    /// Remove and return every pending frame for `subscriber`, oldest first.
    pub fn drain(&mut self, subscriber: &ClientId) -> VecDeque<Bytes> {
        self.queues.remove(subscriber).unwrap_or_default()
    }

    /// Put frames that could not be delivered back at the head of the queue,
    /// ahead of anything queued since. These were admitted once already, so
    /// the capacity bound is not applied again.
    pub fn requeue_front(&mut self, subscriber: &ClientId, mut frames: VecDeque<Bytes>) {
        if frames.is_empty() {
            return;
        }
        let queue = self.queues.entry(subscriber.clone()).or_default();
        frames.append(queue);
        *queue = frames;
    }

    pub fn len(&self, subscriber: &ClientId) -> usize {
        self.queues.get(subscriber).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, subscriber: &ClientId) -> bool {
        self.len(subscriber) == 0
    }

    /// Frames pending across all subscribers.
    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

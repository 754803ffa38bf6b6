//! Topic management
//!
//! A `Topic` holds its subscriptions in arrival order. Topics are created on
//! first subscribe and never removed, even once empty.

use serde::Deserialize;

use crate::transport::frame::ClientId;

/// What a second SUBSCRIBE for the same (topic, subscriber) pair does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubscribePolicy {
    /// Update the existing entry's store-and-forward flag in place.
    #[default]
    Replace,
    /// Append another entry; the subscriber then receives each message once
    /// per entry.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscriber: ClientId,
    pub store_and_forward: bool,
}

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscriptions: Vec<Subscription>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriptions: Vec::new(),
        }
    }

    /// Add a subscription. Returns `true` if an existing entry was updated
    /// instead of a new one being added.
    pub fn subscribe(
        &mut self,
        subscriber: ClientId,
        store_and_forward: bool,
        policy: ResubscribePolicy,
    ) -> bool {
        if policy == ResubscribePolicy::Replace {
            if let Some(existing) = self
                .subscriptions
                .iter_mut()
                .find(|s| s.subscriber == subscriber)
            {
                existing.store_and_forward = store_and_forward;
                return true;
            }
        }

        self.subscriptions.push(Subscription {
            subscriber,
            store_and_forward,
        });
        false
    }

    /// Remove the first subscription held by `subscriber`.
    pub fn unsubscribe(&mut self, subscriber: &ClientId) -> bool {
        match self
            .subscriptions
            .iter()
            .position(|s| &s.subscriber == subscriber)
        {
            Some(index) => {
                self.subscriptions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, subscriber: &ClientId) -> bool {
        self.subscriptions.iter().any(|s| &s.subscriber == subscriber)
    }
}

//! The `broker` module holds all subscription state and the delivery rules.
//!
//! - `registry`: subscribers, their connections, and the topic index
//! - `queue`: per-subscriber store-and-forward queues
//! - `topic`: subscriptions of a single topic
//! - `message`: a published value and where it came from
//! - `engine`: the `Broker` facade that the dispatcher drives

pub mod engine;
pub mod message;
pub mod queue;
pub mod registry;
pub mod topic;

pub use engine::{Broker, IdentifyOutcome, PublishReport};

#[cfg(test)]
mod tests;

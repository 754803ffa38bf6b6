//! The `client` module covers both ends of a subscriber connection.
//!
//! `Client` is the broker-side handle for one live connection: a connection
//! id plus the channel its socket writer drains. `subscriber` is the
//! subscriber program itself, and `command` parses the operator commands it
//! reads.

pub mod command;
pub mod pubsub_client;
pub mod subscriber;

pub use pubsub_client::{Client, ConnectionId};

//! # RelaySub
//!
//! `relaysub` is an in-memory, topic-based publish/subscribe broker.
//! Publishers fire typed values at it over UDP; subscribers hold TCP
//! connections, identify themselves by a short client id, and receive every
//! value published to the topics they follow. Subscriptions flagged
//! store-and-forward keep collecting messages while their subscriber is
//! offline and replay them, in order, when it returns.
//!
//! ## Core Modules
//!
//! - `broker`: subscribers, topics, store-and-forward queues and the delivery rules.
//! - `client`: the broker-side connection handle and the subscriber program.
//! - `config`: layered configuration (defaults, file, `.env`, environment).
//! - `transport`: wire formats, frame reassembly, connection tasks and the dispatcher loop.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

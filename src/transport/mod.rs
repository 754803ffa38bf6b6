//! The `transport` module is responsible for everything that touches a
//! socket.
//!
//! It defines the wire formats (publisher datagrams and length-prefixed
//! frames), reassembles frames from TCP byte streams, runs one task per
//! subscriber connection, and hosts the dispatcher loop that feeds the
//! broker.

pub mod codec;
pub mod control;
pub mod frame;
pub mod server;
pub mod session;
pub mod value;

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Identifies one accepted TCP connection, independent of the client id
/// that later claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to a live subscriber connection.
///
/// Frames pushed into `sender` are written to the socket, in order, by the
/// task that owns the connection.
#[derive(Debug, Clone)]
pub struct Client {
    /// Connection this handle writes to.
    pub id: ConnectionId,

    /// Outbound frames for the connection task.
    pub sender: UnboundedSender<Bytes>,
}

impl Client {
    pub fn new(sender: UnboundedSender<Bytes>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    /// Queues `frame` for the socket. Hands the frame back if the connection
    /// task has already gone away.
    pub fn send(&self, frame: Bytes) -> Result<(), Bytes> {
        self.sender.send(frame).map_err(|e| e.0)
    }
}

use std::fmt;
use std::net::SocketAddrV4;

use crate::transport::value::{Value, decode_datagram};
use crate::utils::error::CodecError;

/// A value published under a topic, tagged with the UDP sender it came from.
///
/// This is what a PUBLISH frame carries, and what subscribers render as
/// `<ip>:<port> - <topic> - <KIND> - <value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub value: Value,
    pub source: SocketAddrV4,
}

impl Message {
    pub fn new(topic: impl Into<String>, value: Value, source: SocketAddrV4) -> Self {
        Self {
            topic: topic.into(),
            value,
            source,
        }
    }

    /// Decodes a publisher datagram received from `source`.
    pub fn from_datagram(bytes: &[u8], source: SocketAddrV4) -> Result<Self, CodecError> {
        let (topic, value) = decode_datagram(bytes)?;
        Ok(Self {
            topic,
            value,
            source,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.source,
            self.topic,
            self.value.kind(),
            self.value
        )
    }
}

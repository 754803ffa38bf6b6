//! Length-prefixed frames exchanged between the broker and subscribers.
//!
//! ```text
//! offset  size  field
//!      0     4  length, counts every byte of the frame including itself
//!      4     1  type (0 SUBSCRIBE_SF, 1 SUBSCRIBE, 2 UNSUBSCRIBE, 3 PUBLISH, 4 IDENTIFY)
//!      5    13  client id, NUL padded
//!     18     2  UDP source port        (PUBLISH only)
//!     20     4  UDP source IPv4        (PUBLISH only)
//!     24     -  payload: topic bytes, or the datagram layout for PUBLISH
//! ```
//!
//! IDENTIFY frames stop after the client id and are 18 bytes long.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::broker::message::Message;
use crate::transport::value::{self, decode_datagram, encode_datagram, validate_topic};
use crate::utils::error::CodecError;

/// Size of the length field that opens every frame.
pub const LENGTH_FIELD_LEN: usize = 4;
/// Size of the full header preceding the payload.
pub const HEADER_LEN: usize = 24;
/// Total size of an IDENTIFY frame.
pub const IDENTIFY_LEN: usize = 18;
/// Width of the client id field on the wire.
pub const CLIENT_ID_FIELD_LEN: usize = 13;
/// Longest client id accepted.
pub const MAX_CLIENT_ID_LEN: usize = 10;
/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 1580;

/// Type tag carried at offset 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    SubscribeSf = 0,
    Subscribe = 1,
    Unsubscribe = 2,
    Publish = 3,
    Identify = 4,
}

impl TryFrom<u8> for FrameType {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(FrameType::SubscribeSf),
            1 => Ok(FrameType::Subscribe),
            2 => Ok(FrameType::Unsubscribe),
            3 => Ok(FrameType::Publish),
            4 => Ok(FrameType::Identify),
            other => Err(CodecError::UnknownFrameType(other)),
        }
    }
}

/// Subscriber identity: 1 to 10 printable ASCII characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ClientId {
    type Error = CodecError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        let valid = !id.is_empty()
            && id.len() <= MAX_CLIENT_ID_LEN
            && id.bytes().all(|b| b.is_ascii_graphic());
        if !valid {
            return Err(CodecError::InvalidClientId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }
}

impl FromStr for ClientId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Identify {
        client_id: ClientId,
    },
    Subscribe {
        client_id: ClientId,
        topic: String,
        store_and_forward: bool,
    },
    Unsubscribe {
        client_id: ClientId,
        topic: String,
    },
    Publish(Message),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Identify { .. } => FrameType::Identify,
            Frame::Subscribe {
                store_and_forward: true,
                ..
            } => FrameType::SubscribeSf,
            Frame::Subscribe { .. } => FrameType::Subscribe,
            Frame::Unsubscribe { .. } => FrameType::Unsubscribe,
            Frame::Publish(_) => FrameType::Publish,
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        match self {
            Frame::Identify { client_id } => Ok(encode_identify(client_id)),
            Frame::Subscribe {
                client_id,
                topic,
                store_and_forward,
            } => encode_subscribe(client_id, topic, *store_and_forward),
            Frame::Unsubscribe { client_id, topic } => encode_unsubscribe(client_id, topic),
            Frame::Publish(message) => encode_publish(message),
        }
    }
}

pub fn encode_identify(client_id: &ClientId) -> Bytes {
    let mut buf = BytesMut::with_capacity(IDENTIFY_LEN);
    buf.put_u32(IDENTIFY_LEN as u32);
    buf.put_u8(FrameType::Identify as u8);
    put_client_id(&mut buf, Some(client_id));
    buf.freeze()
}

pub fn encode_subscribe(
    client_id: &ClientId,
    topic: &str,
    store_and_forward: bool,
) -> Result<Bytes, CodecError> {
    let frame_type = if store_and_forward {
        FrameType::SubscribeSf
    } else {
        FrameType::Subscribe
    };
    encode_topic_frame(frame_type, client_id, topic)
}

pub fn encode_unsubscribe(client_id: &ClientId, topic: &str) -> Result<Bytes, CodecError> {
    encode_topic_frame(FrameType::Unsubscribe, client_id, topic)
}

/// Builds the PUBLISH frame for `message`. The result is shared by every
/// recipient of a fan-out.
pub fn encode_publish(message: &Message) -> Result<Bytes, CodecError> {
    let len = HEADER_LEN + value::encoded_len(&message.value);
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u32(len as u32);
    buf.put_u8(FrameType::Publish as u8);
    put_client_id(&mut buf, None);
    buf.put_u16(message.source.port());
    buf.put_slice(&message.source.ip().octets());
    encode_datagram(&message.topic, &message.value, &mut buf)?;
    debug_assert_eq!(buf.len(), len);
    Ok(buf.freeze())
}

/// Reads the length field and checks it against the accepted range.
pub fn decode_header(header: [u8; LENGTH_FIELD_LEN]) -> Result<usize, CodecError> {
    let length = u32::from_be_bytes(header);
    let accepted = IDENTIFY_LEN..=MAX_FRAME_LEN;
    match usize::try_from(length) {
        Ok(len) if accepted.contains(&len) => Ok(len),
        _ => Err(CodecError::InvalidLength(length)),
    }
}

/// Decodes the bytes that follow the length field. `body` must hold exactly
/// `length - 4` bytes.
pub fn decode_frame(length: usize, body: &[u8]) -> Result<Frame, CodecError> {
    let need = length.saturating_sub(LENGTH_FIELD_LEN);
    if body.len() != need {
        return Err(CodecError::Truncated {
            need,
            got: body.len(),
        });
    }

    if body.len() < IDENTIFY_LEN - LENGTH_FIELD_LEN {
        return Err(CodecError::Truncated {
            need: IDENTIFY_LEN - LENGTH_FIELD_LEN,
            got: body.len(),
        });
    }

    // body offsets are frame offsets minus the length field
    let frame_type = FrameType::try_from(body[0])?;
    let client_id = || client_id_field(body);
    let payload = || {
        body.get(HEADER_LEN - LENGTH_FIELD_LEN..)
            .ok_or(CodecError::Truncated {
                need: HEADER_LEN - LENGTH_FIELD_LEN,
                got: body.len(),
            })
    };

    match frame_type {
        FrameType::Identify => Ok(Frame::Identify {
            client_id: client_id()?,
        }),
        FrameType::Subscribe | FrameType::SubscribeSf => Ok(Frame::Subscribe {
            client_id: client_id()?,
            topic: topic_payload(payload()?)?,
            store_and_forward: frame_type == FrameType::SubscribeSf,
        }),
        FrameType::Unsubscribe => Ok(Frame::Unsubscribe {
            client_id: client_id()?,
            topic: topic_payload(payload()?)?,
        }),
        FrameType::Publish => {
            let (topic, value) = decode_datagram(payload()?)?;
            let port = u16::from_be_bytes([body[14], body[15]]);
            let ip = Ipv4Addr::new(body[16], body[17], body[18], body[19]);
            Ok(Frame::Publish(Message {
                topic,
                value,
                source: SocketAddrV4::new(ip, port),
            }))
        }
    }
}

fn encode_topic_frame(
    frame_type: FrameType,
    client_id: &ClientId,
    topic: &str,
) -> Result<Bytes, CodecError> {
    validate_topic(topic)?;
    let len = HEADER_LEN + topic.len();
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u32(len as u32);
    buf.put_u8(frame_type as u8);
    put_client_id(&mut buf, Some(client_id));
    buf.put_bytes(0, HEADER_LEN - LENGTH_FIELD_LEN - 1 - CLIENT_ID_FIELD_LEN);
    buf.put_slice(topic.as_bytes());
    Ok(buf.freeze())
}

fn put_client_id(buf: &mut BytesMut, client_id: Option<&ClientId>) {
    let id = client_id.map(|id| id.as_str().as_bytes()).unwrap_or_default();
    buf.put_slice(id);
    buf.put_bytes(0, CLIENT_ID_FIELD_LEN - id.len());
}

fn client_id_field(body: &[u8]) -> Result<ClientId, CodecError> {
    let field = &body[1..1 + CLIENT_ID_FIELD_LEN];
    let id = value::text_until_nul(field)
        .map_err(|_| CodecError::InvalidClientId(String::from_utf8_lossy(field).into_owned()))?;
    ClientId::try_from(id.as_str())
}

fn topic_payload(payload: &[u8]) -> Result<String, CodecError> {
    let topic = value::text_until_nul(payload)?;
    validate_topic(&topic)?;
    Ok(topic)
}

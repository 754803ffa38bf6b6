//! Error types used across `relaysub`.
//!
//! Only genuine failures live here. Duplicate connections and closed
//! transports are ordinary outcomes and are modelled by the identify and
//! receive result types instead.

use std::io;

use thiserror::Error;

/// Failure to encode or decode a frame or a published value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("declared frame length {0} is outside the accepted range")]
    InvalidLength(u32),

    #[error("frame truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    #[error("unknown value kind {0}")]
    UnknownValueKind(u8),

    #[error("invalid sign byte {0}")]
    InvalidSign(u8),

    #[error("invalid client id {0:?}")]
    InvalidClientId(String),

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("topic exceeds {max} bytes")]
    TopicTooLong { max: usize },

    #[error("topic contains a NUL byte")]
    NulInTopic,

    #[error("string value contains a NUL byte")]
    NulInString,

    #[error("string value exceeds {max} bytes")]
    StringTooLong { max: usize },

    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    #[error("integer {0} does not fit a sign byte and a 32-bit magnitude")]
    IntOutOfRange(i64),

    #[error("invalid decimal value {0:?}")]
    InvalidDecimal(String),
}

/// Failure while moving frames over a stream transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed with {buffered} bytes of an incomplete frame")]
    ClosedMidFrame { buffered: usize },
}

/// Malformed operator command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}; try exit, subscribe or unsubscribe")]
    Unknown(String),

    #[error("missing topic; try 'subscribe <TOPIC> <SF>' or 'unsubscribe <TOPIC>'")]
    MissingTopic,

    #[error("missing store-and-forward flag; try 'subscribe <TOPIC> <0|1>'")]
    MissingFlag,

    #[error("invalid store-and-forward flag {0:?}; expected 0 or 1")]
    InvalidFlag(String),

    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),

    #[error(transparent)]
    Topic(#[from] CodecError),
}

/// Fatal broker failure. Raised only before the event loop starts, or when
/// the runtime itself fails.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Subscriber-side failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

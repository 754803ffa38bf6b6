//! Published values and the datagram layout UDP publishers use.
//!
//! ```text
//! offset  0   topic, 50 bytes, NUL padded
//! offset 50   value kind (0 INT, 1 SHORT_REAL, 2 FLOAT, 3 STRING)
//! INT         sign u8 @51, magnitude u32 @52
//! SHORT_REAL  magnitude u16 @51, exponent fixed at 2
//! FLOAT       sign u8 @51, magnitude u32 @52, exponent u8 @56
//! STRING      bytes from 51 to the end or the first NUL
//! ```
//!
//! The same layout is carried verbatim as the payload of PUBLISH frames.
//! Multi-byte integers are big-endian.

use std::fmt;
use std::str::FromStr;

use bytes::BufMut;

use crate::utils::error::CodecError;

/// Maximum topic length in bytes.
pub const TOPIC_LEN: usize = 50;
/// Maximum length of a STRING value in bytes.
pub const MAX_STRING_LEN: usize = 1500;
/// Largest datagram a publisher may send.
pub const MAX_DATAGRAM_LEN: usize = TOPIC_LEN + 1 + MAX_STRING_LEN;
/// Implicit exponent of SHORT_REAL values.
pub const SHORT_REAL_EXPONENT: u8 = 2;

const KIND_OFFSET: usize = 50;
const SIGN_OFFSET: usize = 51;
const MAGNITUDE_OFFSET: usize = 52;
const EXPONENT_OFFSET: usize = 56;

/// Discriminant byte that selects the value layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueKind {
    Int = 0,
    ShortReal = 1,
    Float = 2,
    String = 3,
}

impl ValueKind {
    /// Name shown to subscribers.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "INT",
            ValueKind::ShortReal => "SHORT_REAL",
            ValueKind::Float => "FLOAT",
            ValueKind::String => "STRING",
        }
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ValueKind::Int),
            1 => Ok(ValueKind::ShortReal),
            2 => Ok(ValueKind::Float),
            3 => Ok(ValueKind::String),
            other => Err(CodecError::UnknownValueKind(other)),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decimal number carried as `magnitude / 10^exponent`, with the sign kept
/// apart from the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint {
    pub negative: bool,
    pub magnitude: u32,
    pub exponent: u8,
}

impl FixedPoint {
    pub fn new(negative: bool, magnitude: u32, exponent: u8) -> Self {
        Self {
            negative,
            magnitude,
            exponent,
        }
    }
}

/// Renders the integer part, then the fraction zero-padded on the left to
/// `exponent` digits with trailing zeros trimmed. A zero fraction drops the
/// decimal point and a zero magnitude never carries a sign.
impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exponent = usize::from(self.exponent);
        let padded = format!("{:0>width$}", self.magnitude, width = exponent + 1);
        let (integer, fraction) = padded.split_at(padded.len() - exponent);
        let fraction = fraction.trim_end_matches('0');

        if self.negative && self.magnitude != 0 {
            f.write_str("-")?;
        }
        f.write_str(integer)?;
        if !fraction.is_empty() {
            write!(f, ".{fraction}")?;
        }
        Ok(())
    }
}

/// Parses decimal text such as `-12.05` into magnitude and exponent without
/// going through floating point.
impl FromStr for FixedPoint {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidDecimal(s.to_string());
        let (negative, unsigned) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let exponent = u8::try_from(fraction.len()).map_err(|_| invalid())?;
        let digits = format!("{integer}{fraction}");
        let magnitude = digits.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(negative, magnitude, exponent))
    }
}

/// A typed value published under a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Sign byte plus a 32-bit magnitude, so the range is `±u32::MAX`.
    Int(i64),
    /// Unsigned magnitude with an implicit exponent of 2.
    ShortReal(u16),
    Float(FixedPoint),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::ShortReal(_) => ValueKind::ShortReal,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::ShortReal(m) => {
                FixedPoint::new(false, u32::from(*m), SHORT_REAL_EXPONENT).fmt(f)
            }
            Value::Float(fp) => fp.fmt(f),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Display form of a value, as printed by subscribers.
pub fn format_value(value: &Value) -> String {
    value.to_string()
}

/// Checks that `topic` fits the fixed topic field.
pub fn validate_topic(topic: &str) -> Result<(), CodecError> {
    if topic.is_empty() {
        return Err(CodecError::EmptyTopic);
    }
    if topic.len() > TOPIC_LEN {
        return Err(CodecError::TopicTooLong { max: TOPIC_LEN });
    }
    if topic.as_bytes().contains(&0) {
        return Err(CodecError::NulInTopic);
    }
    Ok(())
}

/// Decodes a publisher datagram into its topic and value.
pub fn decode_datagram(bytes: &[u8]) -> Result<(String, Value), CodecError> {
    require(bytes, SIGN_OFFSET)?;

    let topic = text_until_nul(&bytes[..TOPIC_LEN])?;
    if topic.is_empty() {
        return Err(CodecError::EmptyTopic);
    }

    let value = match ValueKind::try_from(bytes[KIND_OFFSET])? {
        ValueKind::Int => {
            require(bytes, MAGNITUDE_OFFSET + 4)?;
            let negative = sign(bytes[SIGN_OFFSET])?;
            let magnitude = i64::from(read_u32(bytes, MAGNITUDE_OFFSET));
            Value::Int(if negative { -magnitude } else { magnitude })
        }
        ValueKind::ShortReal => {
            require(bytes, SIGN_OFFSET + 2)?;
            Value::ShortReal(u16::from_be_bytes([bytes[SIGN_OFFSET], bytes[SIGN_OFFSET + 1]]))
        }
        ValueKind::Float => {
            require(bytes, EXPONENT_OFFSET + 1)?;
            Value::Float(FixedPoint::new(
                sign(bytes[SIGN_OFFSET])?,
                read_u32(bytes, MAGNITUDE_OFFSET),
                bytes[EXPONENT_OFFSET],
            ))
        }
        ValueKind::String => {
            let text = text_until_nul(&bytes[SIGN_OFFSET..])?;
            if text.len() > MAX_STRING_LEN {
                return Err(CodecError::StringTooLong {
                    max: MAX_STRING_LEN,
                });
            }
            Value::String(text)
        }
    };

    Ok((topic, value))
}

/// Appends the datagram layout for `topic` and `value` to `buf`.
pub fn encode_datagram(topic: &str, value: &Value, buf: &mut impl BufMut) -> Result<(), CodecError> {
    validate_topic(topic)?;

    buf.put_slice(topic.as_bytes());
    buf.put_bytes(0, TOPIC_LEN - topic.len());
    buf.put_u8(value.kind() as u8);

    match value {
        Value::Int(v) => {
            let magnitude =
                u32::try_from(v.unsigned_abs()).map_err(|_| CodecError::IntOutOfRange(*v))?;
            buf.put_u8(u8::from(*v < 0));
            buf.put_u32(magnitude);
        }
        Value::ShortReal(m) => buf.put_u16(*m),
        Value::Float(fp) => {
            buf.put_u8(u8::from(fp.negative));
            buf.put_u32(fp.magnitude);
            buf.put_u8(fp.exponent);
        }
        Value::String(s) => {
            if s.len() > MAX_STRING_LEN {
                return Err(CodecError::StringTooLong {
                    max: MAX_STRING_LEN,
                });
            }
            // decoding stops at the first NUL
            if s.as_bytes().contains(&0) {
                return Err(CodecError::NulInString);
            }
            buf.put_slice(s.as_bytes());
        }
    }
    Ok(())
}

/// Length `encode_datagram` produces for `value`.
pub fn encoded_len(value: &Value) -> usize {
    SIGN_OFFSET
        + match value {
            Value::Int(_) => 5,
            Value::ShortReal(_) => 2,
            Value::Float(_) => 6,
            Value::String(s) => s.len(),
        }
}

fn require(bytes: &[u8], need: usize) -> Result<(), CodecError> {
    if bytes.len() < need {
        return Err(CodecError::Truncated {
            need,
            got: bytes.len(),
        });
    }
    Ok(())
}

fn sign(byte: u8) -> Result<bool, CodecError> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidSign(other)),
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn text_until_nul(bytes: &[u8]) -> Result<String, CodecError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8)
}

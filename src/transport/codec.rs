//! Frame reassembly over a byte stream.
//!
//! TCP delivers frames in arbitrary pieces. Bytes accumulate in a caller-owned
//! `BytesMut` until the declared length is satisfied; nothing after the length
//! field is interpreted before then.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::transport::frame::{Frame, LENGTH_FIELD_LEN, decode_frame, decode_header};
use crate::utils::error::{CodecError, TransportError};

/// Takes one complete frame off the front of `buf`, if one has arrived.
///
/// Returns `Ok(None)` while more bytes are needed. An out-of-range length
/// fails immediately so a bogus prefix can't make us buffer without bound.
pub fn try_decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    if buf.len() < LENGTH_FIELD_LEN {
        return Ok(None);
    }

    let length = decode_header([buf[0], buf[1], buf[2], buf[3]])?;
    if buf.len() < length {
        buf.reserve(length - buf.len());
        return Ok(None);
    }

    let frame = buf.split_to(length);
    decode_frame(length, &frame[LENGTH_FIELD_LEN..]).map(Some)
}

/// Reads until one full frame is buffered and returns it.
///
/// `Ok(None)` means the peer closed the stream cleanly between frames.
/// Partial state lives in `buf`, so dropping this future (for example in a
/// `select!`) loses nothing.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = try_decode(buf)? {
            return Ok(Some(frame));
        }

        if reader.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(TransportError::ClosedMidFrame {
                buffered: buf.len(),
            });
        }
    }
}

/// Writes an encoded frame in full.
pub async fn write_frame<W>(writer: &mut W, frame: &Bytes) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    Ok(())
}

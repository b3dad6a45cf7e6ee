use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Frame header: payload length (4 bytes, little-endian).
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A framed message as received from the wire.
///
/// The payload is raw bytes: the frame boundary is valid even when the bytes
/// inside are not valid JSON, and the two failure modes are handled at
/// different layers.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The message payload (expected to be UTF-8 JSON).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }

    /// Parse the payload as a JSON value.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// Encode a JSON value into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────┬────────────────────┐
/// │ Length (4B LE)│ Payload            │
/// │               │ (Length bytes JSON)│
/// └───────────────┴────────────────────┘
/// ```
pub fn encode_frame(value: &Value, max_frame_size: usize, dst: &mut BytesMut) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        });
    }
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the
/// buffer is left untouched so a later call with more bytes behaves
/// identically. On success, consumes exactly the frame bytes from the buffer.
///
/// A declared length of zero or above `max_frame_size` is unrecoverable: the
/// stream can no longer be resynchronized and the caller must close it.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None); // Need more data
    }

    let declared = u32::from_le_bytes(src[0..4].try_into().expect("4-byte slice")) as usize;

    if declared == 0 {
        return Err(FrameError::ZeroLength);
    }
    if declared > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: declared,
            max: max_frame_size,
        });
    }

    let total = LENGTH_PREFIX_SIZE + declared;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(LENGTH_PREFIX_SIZE);
    let payload = src.split_to(declared).freeze();

    Ok(Some(Frame { payload }))
}

/// `tokio_util::codec` codec for length-prefixed JSON frames.
///
/// Decodes to [`Frame`] (raw payload bytes) and encodes from
/// [`serde_json::Value`].
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with an explicit maximum payload size.
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// The maximum payload size accepted by this codec.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_frame_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, self.max_frame_size, dst)
    }
}

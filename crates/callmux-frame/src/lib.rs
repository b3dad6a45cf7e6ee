//! Length-prefixed JSON message framing for single-channel IPC.
//!
//! Every message on the wire is framed as:
//! - A 4-byte little-endian payload length
//! - A UTF-8 JSON payload of exactly that many bytes
//!
//! There is no magic number and no correlation id in this protocol; frame
//! boundaries are established solely by the length prefix. A declared length
//! of zero or above the configured maximum desynchronizes the stream and is
//! therefore fatal to the connection, while a malformed JSON payload inside a
//! well-formed frame is recoverable (the boundary is still known).

pub mod codec;
pub mod error;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameCodec, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};

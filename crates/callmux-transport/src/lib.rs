//! Channel transports for callmux.
//!
//! Provides the physical byte streams a channel endpoint runs over:
//! - A spawned subprocess's stdin/stdout
//! - A Unix domain socket connection (Linux/macOS)
//!
//! This is the lowest layer of callmux. A transport is consumed by splitting
//! it into its read and write halves; everything above deals only in
//! `AsyncRead`/`AsyncWrite`.

pub mod error;
pub mod stdio;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stdio::spawn;

#[cfg(unix)]
pub use uds::connect;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

/// Boxed read half of a transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One physical byte-stream channel, ready to be split into halves.
///
/// When the transport wraps a subprocess, the child handle travels with the
/// split halves so the process is reaped (and killed on drop) by whoever owns
/// the endpoint.
pub struct ChannelTransport {
    reader: BoxedReader,
    writer: BoxedWriter,
    child: Option<Child>,
}

impl ChannelTransport {
    /// Build a transport from already-open read/write halves.
    ///
    /// This is the seam the outer layer uses to hand the core an accepted
    /// socket or any other pre-established stream pair.
    pub fn from_parts(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        }
    }

    pub(crate) fn with_child(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        child: Child,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: Some(child),
        }
    }

    /// Split into read half, write half, and the child process handle if any.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter, Option<Child>) {
        (self.reader, self.writer, self.child)
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("subprocess", &self.child.is_some())
            .finish()
    }
}

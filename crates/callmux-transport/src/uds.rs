use std::path::Path;

use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::ChannelTransport;

/// Connect to a listening Unix domain socket.
pub async fn connect(path: impl AsRef<Path>) -> Result<ChannelTransport> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), "connected channel socket");

    let (read_half, write_half) = stream.into_split();
    Ok(ChannelTransport::from_parts(read_half, write_half))
}

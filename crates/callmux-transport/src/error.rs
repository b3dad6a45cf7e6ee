use std::path::PathBuf;

/// Errors that can occur while establishing a channel transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to spawn the subprocess.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The spawned subprocess did not expose the expected stdio stream.
    #[error("subprocess {command} has no piped {stream}")]
    MissingStdio {
        command: String,
        stream: &'static str,
    },

    /// Failed to connect to the specified socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

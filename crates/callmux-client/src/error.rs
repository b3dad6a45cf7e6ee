use std::time::Duration;

/// Errors surfaced to a caller awaiting a dispatched call.
///
/// Every `call()` terminates with a matched result or exactly one of these;
/// a caller never hangs past the configured timeout.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// No response was matched within the timeout window.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The channel endpoint terminated while the call was outstanding.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The shared bootstrap could not complete; nothing was submitted.
    #[error("initialization failed: {0}")]
    InitFailed(String),

    /// The matched response carried an application-level error payload.
    #[error("remote error: {0}")]
    Remote(serde_json::Value),

    /// Frame-level error on the send path.
    #[error("frame error: {0}")]
    Frame(#[from] callmux_frame::FrameError),

    /// Transport could not be established.
    #[error("transport error: {0}")]
    Transport(#[from] callmux_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, CallError>;

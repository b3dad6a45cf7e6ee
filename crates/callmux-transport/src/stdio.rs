use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::ChannelTransport;

/// Spawn a subprocess and adopt its stdin/stdout as the channel.
///
/// stderr is inherited so the child's diagnostics reach the parent's stderr
/// unframed. The child is killed when the returned handle is dropped.
pub fn spawn(command: &str, args: &[String]) -> Result<ChannelTransport> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TransportError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or_else(|| TransportError::MissingStdio {
        command: command.to_string(),
        stream: "stdin",
    })?;
    let stdout = child.stdout.take().ok_or_else(|| TransportError::MissingStdio {
        command: command.to_string(),
        stream: "stdout",
    })?;

    debug!(command, pid = ?child.id(), "spawned channel subprocess");

    Ok(ChannelTransport::with_child(stdout, stdin, child))
}

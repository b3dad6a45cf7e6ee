use std::time::Duration;

use callmux_frame::DEFAULT_MAX_FRAME_SIZE;
use callmux_transport::ChannelTransport;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{CallError, Result};
use crate::single_flight::SingleFlight;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Request envelope written to the channel.
#[derive(Debug, Serialize)]
struct CallEnvelope<'a> {
    name: &'a str,
    args: &'a Value,
}

/// The shared-context call issued once before any dependent tool call.
#[derive(Debug, Clone)]
pub struct BootstrapCall {
    pub name: String,
    pub args: Value,
}

impl BootstrapCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Dispatcher configuration, supplied by the owning layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout. Default: 60 seconds.
    pub call_timeout: Duration,
    /// Maximum frame payload size. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Optional bootstrap call gating every `call()` until it completes.
    pub bootstrap: Option<BootstrapCall>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            bootstrap: None,
        }
    }
}

/// Public entry point for issuing tool calls over one shared channel.
///
/// Any number of caller tasks may invoke [`Dispatcher::call`] concurrently;
/// the dispatcher serializes submissions so FIFO response matching stays
/// correct, gates calls behind the single-flight bootstrap when one is
/// configured, and enforces the per-call timeout.
pub struct Dispatcher {
    endpoint: Endpoint,
    bootstrap: SingleFlight<Value>,
    config: ClientConfig,
}

impl Dispatcher {
    /// Build a dispatcher over an established transport.
    pub fn new(transport: ChannelTransport, config: ClientConfig) -> Self {
        Self {
            endpoint: Endpoint::new(transport, config.max_frame_size),
            bootstrap: SingleFlight::new(),
            config,
        }
    }

    /// Issue a call and await its matched response.
    ///
    /// Resolves with the response's `result` value, or fails with exactly one
    /// of [`CallError::Timeout`], [`CallError::ChannelClosed`],
    /// [`CallError::InitFailed`], or [`CallError::Remote`].
    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        self.ensure_bootstrap().await?;
        self.submit(name, args).await
    }

    /// Shared context established by the bootstrap call, once ready.
    pub fn context(&self) -> Option<Value> {
        self.bootstrap.get()
    }

    /// Token cancelled when the underlying channel terminates.
    pub fn closed(&self) -> CancellationToken {
        self.endpoint.closed()
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    async fn ensure_bootstrap(&self) -> Result<()> {
        let Some(bootstrap) = &self.config.bootstrap else {
            return Ok(());
        };
        self.bootstrap
            .get_or_init(|| {
                debug!(name = %bootstrap.name, "submitting bootstrap call");
                self.submit(&bootstrap.name, bootstrap.args.clone())
            })
            .await
            .map(drop)
    }

    async fn submit(&self, name: &str, args: Value) -> Result<Value> {
        let envelope = serde_json::to_value(CallEnvelope { name, args: &args })
            .map_err(|err| CallError::Frame(err.into()))?;
        let (seq, mut rx) = self.endpoint.submit(envelope).await?;

        let timeout = self.config.call_timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        tokio::select! {
            biased;
            outcome = &mut rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(CallError::ChannelClosed("pending entry dropped".to_string())),
            },
            _ = &mut deadline => {
                if self.endpoint.ledger().evict(seq, CallError::Timeout(timeout)) {
                    Err(CallError::Timeout(timeout))
                } else {
                    // The response was matched in the same instant the timer
                    // fired; its outcome is already in the channel.
                    match rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(CallError::ChannelClosed("pending entry dropped".to_string())),
                    }
                }
            }
        }
    }
}

use std::sync::Arc;

use callmux_frame::FrameCodec;
use callmux_transport::{BoxedReader, BoxedWriter, ChannelTransport};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{CallError, Result};
use crate::ledger::{CallOutcome, PendingLedger};

/// Owner of one physical channel and its framing state.
///
/// The endpoint spawns a reader task that turns inbound bytes into JSON
/// values and feeds them to the pending ledger. Outbound frames go through a
/// single mutex-guarded writer so each frame is one uninterleaved write, and
/// the write + ledger enqueue form one critical section per submission.
///
/// A fatal framing error or transport EOF closes the endpoint: the reader
/// stops, the close token fires, and every pending entry is rejected. The
/// endpoint is never reopened; reconnection is the owner's concern.
pub struct Endpoint {
    writer: tokio::sync::Mutex<FramedWrite<BoxedWriter, FrameCodec>>,
    ledger: Arc<PendingLedger>,
    closed: CancellationToken,
    reader: JoinHandle<()>,
    // Keeps a spawned subprocess alive for the endpoint's lifetime
    // (kill-on-drop reaps it with us).
    _child: Option<Child>,
}

impl Endpoint {
    /// Take ownership of a transport and start the reader task.
    pub fn new(transport: ChannelTransport, max_frame_size: usize) -> Self {
        let (read_half, write_half, child) = transport.into_split();
        let ledger = Arc::new(PendingLedger::new());
        let closed = CancellationToken::new();

        let frames = FramedRead::new(read_half, FrameCodec::new(max_frame_size));
        let reader = tokio::spawn(read_loop(frames, Arc::clone(&ledger), closed.clone()));

        Self {
            writer: tokio::sync::Mutex::new(FramedWrite::new(
                write_half,
                FrameCodec::new(max_frame_size),
            )),
            ledger,
            closed,
            reader,
            _child: child,
        }
    }

    /// Write one frame and register its pending entry atomically.
    ///
    /// Holding the writer lock across both steps is what makes FIFO matching
    /// sound: no other submission can put its frame between ours and our
    /// ledger entry.
    pub(crate) async fn submit(&self, message: Value) -> Result<(u64, oneshot::Receiver<CallOutcome>)> {
        if self.closed.is_cancelled() {
            return Err(CallError::ChannelClosed("endpoint closed".to_string()));
        }

        let mut writer = self.writer.lock().await;
        let (seq, rx) = self.ledger.enqueue();
        if let Err(err) = writer.send(message).await {
            self.ledger
                .evict(seq, CallError::ChannelClosed("send failed".to_string()));
            return Err(err.into());
        }
        // The reader can cancel and drain between the entry check and the
        // enqueue above; an entry landing in that window would sit until its
        // timeout. Re-check now that the entry is registered.
        if self.closed.is_cancelled() {
            self.ledger
                .evict(seq, CallError::ChannelClosed("endpoint closed".to_string()));
            return Err(CallError::ChannelClosed("endpoint closed".to_string()));
        }
        Ok((seq, rx))
    }

    pub(crate) fn ledger(&self) -> &PendingLedger {
        &self.ledger
    }

    /// Token cancelled when the endpoint terminates.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.reader.abort();
        self.closed.cancel();
    }
}

async fn read_loop(
    mut frames: FramedRead<BoxedReader, FrameCodec>,
    ledger: Arc<PendingLedger>,
    closed: CancellationToken,
) {
    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => match frame.to_value() {
                Ok(value) => {
                    if !ledger.match_oldest(value) {
                        debug!("discarding orphan response (no pending call)");
                    }
                }
                // The frame boundary was valid, so the stream is still in
                // sync; only this payload is lost.
                Err(err) => warn!(%err, "discarding frame with malformed JSON payload"),
            },
            Err(err) => {
                error!(%err, "fatal framing error, closing channel");
                break;
            }
        }
    }

    closed.cancel();
    ledger.drain_all("channel closed");
}

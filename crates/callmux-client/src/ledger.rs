use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::CallError;

/// Outcome delivered to the caller awaiting a pending call.
pub type CallOutcome = Result<Value, CallError>;

struct PendingCall {
    seq: u64,
    submitted_at: Instant,
    tx: oneshot::Sender<CallOutcome>,
}

/// Insertion-ordered ledger of in-flight requests on one channel.
///
/// Responses on the wire carry no correlation id, so iteration order is the
/// sole correlation mechanism: the next response always resolves the oldest
/// entry. Eviction (timeout) removes an entry from anywhere in the ledger
/// without disturbing the relative order of the rest.
///
/// Each entry is resolved exactly once: the `oneshot` sender is consumed by
/// whichever of {match, evict, drain} gets there first, and the others find
/// the entry gone.
pub struct PendingLedger {
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    entries: VecDeque<PendingCall>,
    next_seq: u64,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                entries: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Append a fresh pending entry and hand back its sequence id and the
    /// receiver the caller will await.
    ///
    /// FIFO correctness requires the caller to hold the endpoint's send lock
    /// across the write-frame + enqueue pair; the ledger's own lock only
    /// protects the collection itself.
    pub fn enqueue(&self) -> (u64, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(PendingCall {
            seq,
            submitted_at: Instant::now(),
            tx,
        });
        (seq, rx)
    }

    /// Resolve the oldest pending entry with a received response.
    ///
    /// A response whose top-level object carries an `"error"` member rejects
    /// the entry with [`CallError::Remote`]; otherwise the entry resolves
    /// with the `"result"` member when present, or the whole value.
    ///
    /// Returns `false` when no entry was pending (an orphan response, e.g. an
    /// out-of-band notification); the caller logs and discards it.
    pub fn match_oldest(&self, response: Value) -> bool {
        let entry = match self.lock().entries.pop_front() {
            Some(entry) => entry,
            None => return false,
        };

        debug!(
            seq = entry.seq,
            elapsed_ms = entry.submitted_at.elapsed().as_millis() as u64,
            "matched response to oldest pending call"
        );

        let outcome = match response {
            Value::Object(mut map) if map.contains_key("error") => {
                Err(CallError::Remote(map.remove("error").unwrap_or(Value::Null)))
            }
            Value::Object(mut map) if map.contains_key("result") => {
                Ok(map.remove("result").unwrap_or(Value::Null))
            }
            other => Ok(other),
        };

        // The caller may have stopped waiting (timeout raced the match).
        let _ = entry.tx.send(outcome);
        true
    }

    /// Remove one entry by sequence id and reject it with `reason`.
    ///
    /// Used by a call's own timeout firing; the entry may be anywhere in the
    /// ledger, and removal preserves the relative order of the remainder.
    /// Returns `false` if the entry was already resolved.
    pub fn evict(&self, seq: u64, reason: CallError) -> bool {
        let entry = {
            let mut inner = self.lock();
            match inner.entries.iter().position(|entry| entry.seq == seq) {
                Some(idx) => inner.entries.remove(idx),
                None => None,
            }
        };

        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Err(reason));
                true
            }
            None => false,
        }
    }

    /// Reject every pending entry with a channel-closed error and clear the
    /// ledger. Called once when the endpoint terminates.
    pub fn drain_all(&self, reason: &str) {
        let entries = std::mem::take(&mut self.lock().entries);
        if !entries.is_empty() {
            debug!(count = entries.len(), reason, "draining pending ledger");
        }
        for entry in entries {
            let _ = entry
                .tx
                .send(Err(CallError::ChannelClosed(reason.to_string())));
        }
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // Entry resolution never panics while holding the lock.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PendingLedger {
    fn default() -> Self {
        Self::new()
    }
}

//! Single-channel request multiplexer with FIFO response matching.
//!
//! The wire protocol carried by a callmux channel has no correlation ids:
//! the only way to pair a response with its request is the order in which
//! requests were written. This crate keeps that pairing correct for many
//! concurrent callers sharing one channel:
//!
//! - [`Endpoint`] owns the physical transport and its framing state, and
//!   drives a reader task that matches inbound responses.
//! - [`PendingLedger`] is the insertion-ordered ledger of in-flight calls;
//!   the oldest entry is resolved by the next response.
//! - [`SingleFlight`] performs the one-time shared bootstrap (for example,
//!   establishing a workspace/group id) exactly once per attempt, however
//!   many callers race to need it.
//! - [`Dispatcher`] is the public entry point: `call(name, args)` submits a
//!   tool call and resolves when its response is matched, the per-call
//!   timeout fires, or the channel closes.
//!
//! Known limitation: if the remote peer ever replies out of order, FIFO
//! matching silently hands results to the wrong callers. The protocol gives
//! this layer nothing to detect that with; the peer contract (one in-order
//! reply per request) is load-bearing.

pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod ledger;
pub mod single_flight;

pub use dispatcher::{BootstrapCall, ClientConfig, Dispatcher};
pub use endpoint::Endpoint;
pub use error::{CallError, Result};
pub use ledger::PendingLedger;
pub use single_flight::SingleFlight;

//! Bridge one framed request/response channel to many concurrent callers.
//!
//! callmux multiplexes independent caller sessions onto a single
//! length-prefixed JSON channel (a subprocess's stdio or a Unix socket)
//! whose responses carry no correlation ids, matching each response to the
//! oldest pending request.
//!
//! # Crate Structure
//!
//! - [`transport`] — Channel transports (subprocess stdio, Unix sockets)
//! - [`frame`] — Length-prefixed JSON framing
//! - [`client`] — Pending-request ledger, single-flight bootstrap, dispatcher

/// Re-export transport types.
pub mod transport {
    pub use callmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use callmux_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use callmux_client::*;
}

//! # DCCP Protocol
//!
//! The connection core of the **D**atagram **C**ongestion **C**ontrol
//! **P**rotocol (RFC 4340): an unreliable, congestion-managed datagram
//! transport. This crate provides:
//!
//! - **State machine**: the nine connection states, from LISTEN/REQUEST to
//!   TIMEWAIT/CLOSED
//! - **Inbound pipeline**: the 15-step packet processing of RFC 4340 §8.5
//! - **Idle loop**: congestion-control polling, retransmissions and timeouts
//! - **Pluggable congestion control**: sender/receiver traits plus a
//!   fixed-rate reference algorithm (CCID 0xF)
//!
//! The core consumes decoded [`Header`]s from a [`HalfConn`]; wire encoding
//! and socket demultiplexing live below that trait.
//!
//! ## Feature Flags
//!
//! - `sandbox` (default): in-memory half-connection pipe for tests and
//!   simulations
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and the half-connection trait
//! - [`header`]: header fields and 48-bit sequence arithmetic
//! - [`cc`]: congestion-control contract and the fixed-rate algorithm
//! - [`conn`]: the connection itself
//! - [`transport`]: half-connection implementations (requires `sandbox`)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dccp_protocol::prelude::*;
//!
//! # async fn run() -> ConnResult<()> {
//! let (client_end, server_end) = pipe();
//! let cc = FixedRate::default();
//!
//! let server = Conn::new_server(
//!     server_end,
//!     cc.new_sender(),
//!     cc.new_receiver(),
//!     ConnConfigBuilder::new().name("server").build(),
//! );
//! let client = Conn::new_client(
//!     client_end,
//!     cc.new_sender(),
//!     cc.new_receiver(),
//!     ConnConfigBuilder::new().name("client").build(),
//! );
//!
//! while client.state() != ConnState::Open {
//!     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//! }
//! client.write_segment(b"hello").await?;
//! let segment = server.read_segment().await?;
//! assert_eq!(segment, b"hello");
//!
//! server.close()?;
//! Waiter::all([client.waiter(), server.waiter()]).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cc;
pub mod conn;
pub mod core;
pub mod header;

// In-memory transport (feature-gated)
#[cfg(feature = "sandbox")]
#[cfg_attr(docsrs, doc(cfg(feature = "sandbox")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cc::*;
    pub use crate::conn::{
        Conn, ConnConfig, ConnConfigBuilder, ConnState, Role, SequenceWindow, SlidingWindow,
        Waiter,
    };
    pub use crate::core::*;
    pub use crate::header::{Header, HeaderOption, HeaderType, ResetCode};

    #[cfg(feature = "sandbox")]
    pub use crate::transport::{PipeBuilder, PipeConfig, PipeEnd, pipe};
}

// Re-export commonly used items at crate root
pub use cc::{CongestionControl, FixedRate, ReceiverCongestionControl, SenderCongestionControl};
pub use conn::{Conn, ConnConfig, ConnConfigBuilder, ConnState, Waiter};
pub use crate::core::{ConnError, ConnResult, HalfConn, TransportError};
pub use header::{Header, HeaderType, ResetCode};

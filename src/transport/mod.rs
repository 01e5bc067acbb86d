//! Half-connection implementations.
//!
//! - [`pipe`]: an in-memory pair joined by fixed-latency delivery lines, used
//!   by the sandbox tests and for deterministic simulations under paused
//!   tokio time
//!
//! Real transports implement [`HalfConn`](crate::core::HalfConn) on top of
//! their own codec; the connection never sees bytes.

mod pipe;

pub use pipe::*;

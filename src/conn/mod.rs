//! The DCCP connection: state machine, inbound pipeline and background loops.
//!
//! A [`Conn`] owns a half-connection and a congestion-control pair. Three
//! tasks run per connection:
//!
//! - the read loop feeds each inbound header through the 15-step pipeline
//! - the idle loop polls congestion control and drives timers
//! - the write loop stamps CC fields on outbound headers and sends them
//!
//! All protocol state lives behind one lock; pipeline steps and header
//! generation only ever see it through `&mut`.

#[allow(clippy::module_inception)]
mod conn;
mod config;
mod generate;
mod loops;
mod socket;
mod steps;
mod timer;
mod window;

pub use config::{ConnConfig, ConnConfigBuilder};
pub use conn::{Conn, Waiter};
pub use loops::idle_interval;
pub use socket::{ConnState, Role};
pub use timer::{Retransmit, RetransmitTimer};
pub use window::{MAX_SEQUENCE_WINDOW, SequenceWindow, SlidingWindow};

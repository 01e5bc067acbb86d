//! Pluggable congestion control.
//!
//! - [`SenderCongestionControl`] / [`ReceiverCongestionControl`]: the
//!   capability sets a connection drives
//! - [`CongestionControl`]: factory for a matching pair
//! - [`FixedRate`]: the fixed-rate reference algorithm (CCID 0xF)
//!
//! Signals travel back to the connection as [`CongestionError`]:
//! `Reset(code)` aborts the connection with that code, `Ack` sends one Ack
//! immediately, anything else is logged.
//!
//! [`CongestionError`]: crate::core::CongestionError

mod control;
mod fixed;

pub use control::*;
pub use fixed::{FIXED_MAX_SEGMENT_SIZE, FixedRate, FixedRateReceiver, FixedRateSender};
